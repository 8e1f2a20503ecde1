pub mod apply;
pub mod list;

use anyhow::Result;
use reconcile::PatchesRepository;

use crate::Context;
use crate::config::Project;
use crate::paths;
use crate::store::DirectoryStore;

/// Load the configuration and the installed packages it applies to
pub fn open(ctx: &Context) -> Result<(Project, PatchesRepository<DirectoryStore>)> {
    let path = paths::config_file(ctx.config.as_deref())?;
    let project = Project::load(&path)?;
    log::info!("Using {}", project.config_path.display());
    let patches = project.desired_patches()?;

    let store = DirectoryStore::new(
        project.vendor_dir(),
        project.state_dir(),
        project.config.reinstall_command.clone(),
    );
    let packages = store.discover()?;

    Ok((project, PatchesRepository::new(patches, packages, store)))
}
