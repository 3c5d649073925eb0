use std::fs;

use habitnet::{
    FileAsset, MetaLearner, MetaLearningConfig, ModelError, NetworkParameters, NetworkShape,
    ParameterCodec, VersionedModel,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::NamedTempFile;

fn trained_like_parameters() -> NetworkParameters {
    let mut rng = StdRng::seed_from_u64(2024);
    NetworkParameters::random(NetworkShape::default(), 0.5, &mut rng).unwrap()
}

#[test]
fn test_versioned_save_and_load_json() {
    let params = trained_like_parameters();
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string() + ".json";

    params
        .save_versioned(&path, Some("Test model".to_string()))
        .expect("Failed to save versioned model");
    let loaded = NetworkParameters::load_versioned(&path).expect("Failed to load versioned model");

    assert_eq!(loaded, params);
    fs::remove_file(&path).ok();
}

#[test]
fn test_versioned_save_and_load_binary() {
    let params = trained_like_parameters();
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string() + ".bin";

    params
        .save_versioned(&path, None)
        .expect("Failed to save versioned model");
    let loaded = NetworkParameters::load_versioned(&path).expect("Failed to load versioned model");

    assert_eq!(loaded, params);
    fs::remove_file(&path).ok();
}

#[test]
fn test_tampered_file_is_rejected() {
    let params = trained_like_parameters();
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string() + ".json";
    params.save_versioned(&path, None).unwrap();

    let mut versioned = VersionedModel::load_from_file(&path).unwrap();
    versioned.data[40] = versioned.data[40].wrapping_add(1);
    versioned.save_to_file(&path).unwrap();

    assert!(matches!(
        NetworkParameters::load_versioned(&path),
        Err(ModelError::Serialization { .. })
    ));
    fs::remove_file(&path).ok();
}

#[test]
fn test_load_missing_file() {
    assert!(matches!(
        NetworkParameters::load_versioned("/nonexistent/model.bin"),
        Err(ModelError::DatasetLoad { .. })
    ));
}

#[test]
fn test_raw_blob_asset_seeds_meta_learner() {
    let params = trained_like_parameters();
    let blob_file = NamedTempFile::new().unwrap();
    fs::write(blob_file.path(), ParameterCodec::serialize(&params)).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let learner = MetaLearner::from_asset(
        MetaLearningConfig::default(),
        &FileAsset::new(blob_file.path()),
        &mut rng,
    )
    .unwrap();
    assert_eq!(learner.parameters(), &params);
}

#[test]
fn test_wrong_shape_asset_falls_back_to_random() {
    let small = NetworkParameters::zeros(NetworkShape::new(2, 2, 1));
    let blob = ParameterCodec::serialize(&small);

    let mut rng = StdRng::seed_from_u64(1);
    let learner = MetaLearner::from_asset(MetaLearningConfig::default(), &blob, &mut rng).unwrap();
    assert_eq!(learner.parameters().shape(), NetworkShape::default());
}
