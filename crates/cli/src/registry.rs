use std::path::{Path, PathBuf};

use regraft_core::model_spec::ModelSpec;
use thiserror::Error;

pub const SUPPORTED_MODELS: [&str; 6] = [
    "ssd_mobilenet_v1_coco",
    "ssd_mobilenet_v1_egohands",
    "ssd_mobilenet_v2_coco",
    "ssd_mobilenet_v2_egohands",
    "ssd_inception_v2_coco",
    "ssdlite_mobilenet_v2_coco",
];

/// A registry entry: the detector configuration plus the three on-disk
/// artifacts of a run.
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub spec: ModelSpec,
    /// Frozen input graph.
    pub input_pb: PathBuf,
    /// Rewritten interchange graph.
    pub tmp_uff: PathBuf,
    /// Serialized inference engine.
    pub output_bin: PathBuf,
}

#[derive(Debug, Error)]
#[error("Unknown model '{0}', expected one of: ssd_mobilenet_v1_coco, ssd_mobilenet_v1_egohands, ssd_mobilenet_v2_coco, ssd_mobilenet_v2_egohands, ssd_inception_v2_coco, ssdlite_mobilenet_v2_coco")]
pub struct UnknownModel(pub String);

/// Exact-key lookup against the closed set of supported detectors. An
/// unknown identifier is a configuration error raised before any graph work
/// starts.
pub fn lookup(model: &str, model_dir: &Path) -> Result<ModelEntry, UnknownModel> {
    let spec = match model {
        "ssd_mobilenet_v1_coco" => ModelSpec {
            num_classes: 91,
            min_size: 0.2,
            max_size: 0.95,
            input_order: [0, 2, 1],
        },
        "ssd_mobilenet_v1_egohands" => ModelSpec {
            num_classes: 2,
            min_size: 0.05,
            max_size: 0.95,
            input_order: [0, 2, 1],
        },
        "ssd_mobilenet_v2_coco" => ModelSpec {
            num_classes: 91,
            min_size: 0.2,
            max_size: 0.95,
            input_order: [1, 0, 2],
        },
        "ssd_mobilenet_v2_egohands" => ModelSpec {
            num_classes: 2,
            min_size: 0.05,
            max_size: 0.95,
            input_order: [0, 2, 1],
        },
        "ssd_inception_v2_coco" => ModelSpec {
            num_classes: 91,
            min_size: 0.2,
            max_size: 0.95,
            input_order: [0, 2, 1],
        },
        "ssdlite_mobilenet_v2_coco" => ModelSpec {
            num_classes: 91,
            min_size: 0.2,
            max_size: 0.95,
            input_order: [0, 2, 1],
        },
        _ => return Err(UnknownModel(model.to_string())),
    };

    Ok(ModelEntry {
        spec,
        input_pb: model_dir.join(format!("{model}.pb")),
        tmp_uff: model_dir.join(format!("{model}.uff")),
        output_bin: model_dir.join(format!("TRT_{model}.bin")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_model_resolves() {
        for model in SUPPORTED_MODELS {
            assert!(lookup(model, Path::new(".")).is_ok(), "{model}");
        }
    }

    #[test]
    fn unknown_model_is_a_configuration_error() {
        let err = lookup("yolo_v3", Path::new(".")).unwrap_err();
        assert_eq!(err.0, "yolo_v3");
    }

    #[test]
    fn v2_coco_swaps_loc_and_conf() {
        let entry = lookup("ssd_mobilenet_v2_coco", Path::new("/models")).unwrap();
        assert_eq!(entry.spec.input_order, [1, 0, 2]);
        assert_eq!(
            entry.input_pb,
            Path::new("/models/ssd_mobilenet_v2_coco.pb")
        );
        assert_eq!(
            entry.output_bin,
            Path::new("/models/TRT_ssd_mobilenet_v2_coco.bin")
        );
    }
}
