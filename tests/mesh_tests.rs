//! Mesh file handling and offset queries
use approx::assert_relative_eq;
use mesh_leveller::error::MeshError;
use mesh_leveller::mesh::{MergeStrategy, Mesh, MeshModel, Point};

fn sample_mesh() -> Mesh {
    let mut points = Vec::new();
    for x in [-75.0, 0.0, 75.0] {
        for y in [-75.0, 0.0, 75.0] {
            points.push(Point::new(x, y, 52.0 + 0.002 * x - 0.001 * y));
        }
    }
    let mut mesh = Mesh::from_samples(points);
    mesh.set_material_offset("PLA", 0.05).unwrap();
    mesh.set_material_offset("PETG", -0.02).unwrap();
    mesh
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bed.mesh");
    let mesh = sample_mesh();

    mesh.save(&path).unwrap();
    let loaded = Mesh::load(&path).unwrap();

    assert_eq!(loaded, mesh);
}

#[test]
fn test_record_field_names() {
    let mut buffer = Vec::new();
    sample_mesh().to_writer(&mut buffer).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

    assert!(value["points"].is_array());
    assert_eq!(value["points"][0]["x"], -75.0);
    assert_eq!(value["materialOffsets"]["PLA"], 0.05);
    assert!(value["referenceHeight"].is_number());
}

#[test]
fn test_load_rejects_bad_records() {
    let missing_field = r#"{"points": [], "materialOffsets": {}}"#;
    assert!(matches!(
        Mesh::from_reader(missing_field.as_bytes()),
        Err(MeshError::Format(_))
    ));

    let empty_name = r#"{"points": [], "materialOffsets": {"": 0.1}, "referenceHeight": 1.0}"#;
    assert!(matches!(
        Mesh::from_reader(empty_name.as_bytes()),
        Err(MeshError::Format(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Mesh::load(dir.path().join("missing.mesh")),
        Err(MeshError::Io(_))
    ));
}

#[test]
fn test_offsets_follow_tilt_and_material() {
    let model = MeshModel::new(sample_mesh());

    // Sampled corner, relative to the mean height of the grid
    let reference = model.mesh().reference_height;
    let corner = 52.0 + 0.002 * 75.0 - 0.001 * 75.0;
    assert_relative_eq!(
        model.offset_at(75.0, 75.0, "PLA").unwrap(),
        corner - reference + 0.05,
        epsilon = 1e-9
    );
    assert_relative_eq!(
        model.offset_at(75.0, 75.0, "PETG").unwrap(),
        corner - reference - 0.02,
        epsilon = 1e-9
    );
    assert!(matches!(
        model.offset_at(0.0, 0.0, "ABS"),
        Err(MeshError::MaterialNotFound { ref material }) if material == "ABS"
    ));
}

#[test]
fn test_refresh_without_shared_points_aligns_means() {
    let mut old = sample_mesh();
    let old_reference = old.reference_height;
    let old_mean = old.average_z().unwrap();

    // Same bed probed on a shifted grid, 0.4 mm lower in probe coordinates
    let fresh = Mesh::from_samples(
        old.points
            .iter()
            .map(|p| Point::new(p.x + 1.0, p.y, p.z - 0.4))
            .collect(),
    );

    assert_eq!(old.merge(&fresh), MergeStrategy::Average);
    assert_relative_eq!(old.reference_height, old_reference + 0.4, epsilon = 1e-9);
    assert_relative_eq!(old_mean - fresh.average_z().unwrap(), 0.4, epsilon = 1e-9);
    assert_eq!(old.points, fresh.points);
    assert_eq!(old.materials(), vec!["PETG", "PLA"]);
}

#[test]
fn test_far_queries_get_no_correction() {
    let mut points = Vec::new();
    for x in [-50.0, 0.0, 50.0] {
        for y in [-50.0, 0.0, 50.0] {
            points.push(Point::new(x, y, 52.0 + 0.01 * x));
        }
    }
    let mut mesh = Mesh::new(points, 52.0);
    mesh.set_material_offset("PLA", 0.0).unwrap();
    let model = MeshModel::new(mesh);

    assert_relative_eq!(model.offset_at(50.0, 0.0, "PLA").unwrap(), 0.5, epsilon = 1e-9);
    assert_eq!(model.offset_at(1000.0, 0.0, "PLA").unwrap(), 0.0);
    assert_eq!(model.offset_at(0.0, 50.1, "PLA").unwrap(), 0.0);
}

#[test]
fn test_material_order_is_kept_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bed.mesh");
    let mut mesh = Mesh::new(vec![Point::new(0.0, 0.0, 52.0)], 52.0);
    mesh.set_material_offset("TPU", 0.2).unwrap();
    mesh.set_material_offset("ABS", -0.1).unwrap();
    mesh.save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.find("TPU").unwrap() < text.find("ABS").unwrap());

    let reloaded = Mesh::load(&path).unwrap();
    reloaded.save(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
}
