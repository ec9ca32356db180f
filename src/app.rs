//! Command dispatch for the `mesh-leveller` binary

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::acquisition::ProbeController;
use crate::config::{Command, Config, Settings};
use crate::device::{MotionClient, ProbeClient};
use crate::mesh::{MergeStrategy, Mesh, MeshModel};
use crate::transform::Transformer;

/// Mesh file written when probing without `--mesh`
pub const DEFAULT_MESH_PATH: &str = "new.mesh";

/// Parse arguments, set up logging and run the selected command
pub fn run() -> Result<()> {
    let config = Config::from_args_and_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    if let Some(path) = &config.settings_path {
        log::debug!("settings loaded from {}", path.display());
    }

    execute(&config)
}

/// Run one command against explicit configuration
pub fn execute(config: &Config) -> Result<()> {
    match &config.command {
        Command::Probe { mesh } => probe(&config.settings, mesh.as_deref()),
        Command::Process {
            mesh,
            material,
            gcode,
        } => process(&config.settings, mesh, material, gcode).map(|_| ()),
        Command::Material { mesh, name, offset } => edit_material(mesh, name, *offset),
        Command::ReferenceHeight { mesh, value } => set_reference_height(mesh, *value),
    }
}

fn probe(settings: &Settings, existing: Option<&Path>) -> Result<()> {
    let motion = MotionClient::connect(&settings.printer)?;
    let probe = ProbeClient::connect(&settings.probe)?;
    let mut controller = ProbeController::new(motion, probe, &settings.probe, &settings.grid);
    let fresh = controller.acquire()?;
    drop(controller);

    store_acquired(fresh, existing)?;
    Ok(())
}

/// Merge a freshly acquired mesh into `existing` when it loads, otherwise
/// save it as a new mesh. Returns the path written.
pub fn store_acquired(fresh: Mesh, existing: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = existing {
        match Mesh::load(path) {
            Ok(mut mesh) => {
                match mesh.merge(&fresh) {
                    MergeStrategy::SharedPoint { x, y } => {
                        log::info!("rebased reference height on shared point X{} Y{}", x, y)
                    }
                    MergeStrategy::Average => log::info!(
                        "no shared point between meshes, rebased reference height on mean height"
                    ),
                }
                mesh.save(path)
                    .with_context(|| format!("failed to save mesh to {}", path.display()))?;
                log::info!("mesh updated: {}", path.display());
                return Ok(path.to_path_buf());
            }
            Err(err) => log::warn!(
                "could not load {} ({}), creating a new mesh instead",
                path.display(),
                err
            ),
        }
    }

    let path = existing.map_or_else(|| PathBuf::from(DEFAULT_MESH_PATH), Path::to_path_buf);
    fresh
        .save(&path)
        .with_context(|| format!("failed to save mesh to {}", path.display()))?;
    log::info!("mesh created: {}", path.display());
    Ok(path)
}

/// Level `gcode` against the mesh and return the processed file path
pub fn process(settings: &Settings, mesh: &Path, material: &str, gcode: &Path) -> Result<PathBuf> {
    let model = MeshModel::load(mesh)
        .with_context(|| format!("failed to load mesh from {}", mesh.display()))?;
    let transformer = Transformer::new(&model, material, &settings.transform)?;
    let output = transformer
        .transform_file(gcode)
        .with_context(|| format!("failed to process {}", gcode.display()))?;
    Ok(output)
}

fn edit_material(path: &Path, name: &str, offset: Option<f64>) -> Result<()> {
    let mut mesh = load_mesh(path)?;
    match offset {
        Some(offset) => mesh.set_material_offset(name, offset)?,
        None => mesh.add_material(name)?,
    }
    mesh.save(path)?;
    log::info!("materials in {}: {}", path.display(), mesh.materials().join(", "));
    Ok(())
}

fn set_reference_height(path: &Path, value: f64) -> Result<()> {
    anyhow::ensure!(value.is_finite(), "reference height must be finite");
    let mut mesh = load_mesh(path)?;
    mesh.reference_height = value;
    mesh.save(path)?;
    log::info!("reference height of {} set to {:.3}", path.display(), value);
    Ok(())
}

fn load_mesh(path: &Path) -> Result<Mesh> {
    Mesh::load(path).with_context(|| format!("failed to load mesh from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Point;

    fn config(command: Command) -> Config {
        Config {
            command,
            log_level: "info".to_string(),
            settings: Settings::default(),
            settings_path: None,
        }
    }

    #[test]
    fn test_material_and_reference_height_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bed.mesh");
        Mesh::new(vec![Point::new(0.0, 0.0, 52.0)], 52.0)
            .save(&path)
            .unwrap();

        execute(&config(Command::Material {
            mesh: path.clone(),
            name: "PLA".to_string(),
            offset: None,
        }))
        .unwrap();
        execute(&config(Command::Material {
            mesh: path.clone(),
            name: "PETG".to_string(),
            offset: Some(-0.05),
        }))
        .unwrap();
        execute(&config(Command::ReferenceHeight {
            mesh: path.clone(),
            value: 51.5,
        }))
        .unwrap();

        let mesh = Mesh::load(&path).unwrap();
        assert_eq!(mesh.materials(), vec!["PETG", "PLA"]);
        assert_eq!(mesh.material_offsets["PETG"], -0.05);
        assert_eq!(mesh.reference_height, 51.5);
    }

    #[test]
    fn test_empty_material_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bed.mesh");
        Mesh::new(Vec::new(), 0.0).save(&path).unwrap();

        let result = execute(&config(Command::Material {
            mesh: path,
            name: String::new(),
            offset: None,
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_store_acquired_merges_into_existing_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bed.mesh");
        let mut old = Mesh::new(vec![Point::new(0.0, 0.0, 5.0)], 10.0);
        old.add_material("PLA").unwrap();
        old.save(&path).unwrap();

        let fresh = Mesh::from_samples(vec![Point::new(0.0, 0.0, 2.0)]);
        let written = store_acquired(fresh, Some(&path)).unwrap();

        assert_eq!(written, path);
        let merged = Mesh::load(&path).unwrap();
        assert_eq!(merged.reference_height, 13.0);
        assert_eq!(merged.points, vec![Point::new(0.0, 0.0, 2.0)]);
        assert_eq!(merged.materials(), vec!["PLA"]);
    }

    #[test]
    fn test_store_acquired_creates_mesh_when_existing_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mesh");
        std::fs::write(&path, "not json").unwrap();

        let fresh = Mesh::from_samples(vec![Point::new(1.0, 1.0, 4.0)]);
        store_acquired(fresh.clone(), Some(&path)).unwrap();

        assert_eq!(Mesh::load(&path).unwrap(), fresh);
    }
}
