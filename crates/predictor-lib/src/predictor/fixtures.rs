//! Real ONNX artifacts for tests
//!
//! Builds a linear regressor `hours = features · weights + bias` as an ONNX
//! protobuf, the same graph shape the trainer's exporter writes for linear
//! models.

use super::features::{Feature, FeatureSchema};
use super::manifest::{compute_checksum, ArtifactManifest};
use super::resolver::ResolvedArtifact;
use prost::Message;
use std::fs;
use std::path::Path;
use tract_onnx::pb;
use tract_onnx::pb::tensor_proto::DataType;
use tract_onnx::pb::tensor_shape_proto::{dimension, Dimension};

pub const BIAS: f32 = 2.0;

/// Batch dimension of the graph input
#[derive(Debug, Clone, Copy)]
pub enum Batch {
    Fixed,
    Symbolic,
}

/// Weights reading back the elapsed-time feature only
pub fn elapsed_time_weights(schema: &FeatureSchema) -> Vec<f32> {
    schema
        .features()
        .iter()
        .map(|f| if *f == Feature::TimeSinceLastWatering { 1.0 } else { 0.0 })
        .collect()
}

fn dim(value: dimension::Value) -> Dimension {
    Dimension {
        value: Some(value),
        ..Default::default()
    }
}

fn float_value(name: &str, dims: Vec<dimension::Value>) -> pb::ValueInfoProto {
    pb::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(pb::TypeProto {
            value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                elem_type: DataType::Float as i32,
                shape: Some(pb::TensorShapeProto {
                    dim: dims.into_iter().map(dim).collect(),
                }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn float_tensor(name: &str, dims: Vec<i64>, data: Vec<f32>) -> pb::TensorProto {
    pb::TensorProto {
        name: name.to_string(),
        dims,
        data_type: DataType::Float as i32,
        float_data: data,
        ..Default::default()
    }
}

fn node(op_type: &str, inputs: &[&str], output: &str) -> pb::NodeProto {
    pb::NodeProto {
        name: format!("{}_0", op_type),
        op_type: op_type.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: vec![output.to_string()],
        ..Default::default()
    }
}

/// Encoded `features[1, n] x weights[n, 1] + bias -> hours[1, 1]`
pub fn linear_model(weights: &[f32], bias: f32, batch: Batch) -> Vec<u8> {
    let width = weights.len() as i64;
    let batch_dim = match batch {
        Batch::Fixed => dimension::Value::DimValue(1),
        Batch::Symbolic => dimension::Value::DimParam("batch".to_string()),
    };

    let graph = pb::GraphProto {
        name: "linear_regressor".to_string(),
        node: vec![
            node("MatMul", &["features", "weights"], "product"),
            node("Add", &["product", "bias"], "hours"),
        ],
        initializer: vec![
            float_tensor("weights", vec![width, 1], weights.to_vec()),
            float_tensor("bias", vec![1], vec![bias]),
        ],
        input: vec![float_value(
            "features",
            vec![batch_dim, dimension::Value::DimValue(width)],
        )],
        output: vec![float_value(
            "hours",
            vec![dimension::Value::DimValue(1), dimension::Value::DimValue(1)],
        )],
        ..Default::default()
    };

    pb::ModelProto {
        ir_version: 7,
        producer_name: "greenhouse-trainer".to_string(),
        opset_import: vec![pb::OperatorSetIdProto {
            domain: String::new(),
            version: 13,
        }],
        graph: Some(graph),
        ..Default::default()
    }
    .encode_to_vec()
}

/// Writes the artifact and a manifest pinning its checksum
pub fn write_artifact(
    dir: &Path,
    name: &str,
    bytes: &[u8],
    manifest_extra: &str,
) -> ResolvedArtifact {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    let manifest = format!(
        r#"{{"checksum_sha256": "{}"{}}}"#,
        compute_checksum(bytes),
        manifest_extra
    );
    fs::write(ArtifactManifest::path_for(&path), manifest).unwrap();
    ResolvedArtifact::from_path(&path).unwrap()
}
