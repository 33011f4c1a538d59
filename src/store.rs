//! Hierarchical persistence of nested result trees
//!
//! Fit results are persisted as nested-mapping trees in a hierarchical YAML
//! file: mappings become groups, sequences hold numeric arrays (2D images as
//! nested sequences) and string lists, scalars are stored natively. Key
//! insertion order is preserved, NaN values survive round-trip as `.nan`, and
//! the reserved `attrs` key carries group-level metadata at whatever level it
//! appears.

use std::fs;
use std::path::Path;

use serde_yml::{Mapping, Value};

use crate::error::Error;
use crate::image::ImageFitResult;
use crate::model::FitModelTrait;

/// Reserved key holding group-level metadata rather than nested data.
pub const ATTRS_KEY: &str = "attrs";

/// Serialize a nested-mapping tree to a file.
pub fn save_tree(path: impl AsRef<Path>, tree: &Value) -> Result<(), Error> {
    let text = serde_yml::to_string(tree)?;
    fs::write(path, text)?;
    Ok(())
}

/// Load a nested-mapping tree saved by [save_tree].
pub fn load_tree(path: impl AsRef<Path>) -> Result<Value, Error> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yml::from_str(&text)?)
}

/// Group-level metadata of a tree node, if present.
pub fn attrs_of(tree: &Value) -> Option<&Mapping> {
    tree.get(ATTRS_KEY).and_then(Value::as_mapping)
}

fn float_seq(values: impl IntoIterator<Item = f64>) -> Value {
    Value::Sequence(values.into_iter().map(Value::from).collect())
}

fn parameters_map(params: &crate::model::FitParameters) -> Value {
    let mut map = Mapping::new();
    for (name, value) in params.iter() {
        map.insert(Value::from(name), Value::from(value));
    }
    Value::Mapping(map)
}

/// Project an [ImageFitResult] onto a nested-mapping tree suitable for
/// [save_tree].
///
/// NaN-bearing parameter sets are persisted as-is; "unusable" is part of the
/// data contract, not an error.
pub fn fit_result_tree(result: &ImageFitResult) -> Value {
    let mut attrs = Mapping::new();
    attrs.insert(
        Value::from("projection_fit_method"),
        Value::from(result.method.method_name()),
    );

    let image: Value = Value::Sequence(
        result
            .image
            .rows()
            .into_iter()
            .map(|row| float_seq(row.iter().copied()))
            .collect(),
    );

    let mut tree = Mapping::new();
    tree.insert(Value::from(ATTRS_KEY), Value::Mapping(attrs));
    tree.insert(
        Value::from("centroid"),
        float_seq(result.centroid.iter().copied()),
    );
    tree.insert(
        Value::from("rms_size"),
        float_seq(result.rms_size.iter().copied()),
    );
    tree.insert(
        Value::from("total_intensity"),
        Value::from(result.total_intensity),
    );
    tree.insert(
        Value::from("x_projection_fit_parameters"),
        parameters_map(&result.x_parameters),
    );
    tree.insert(
        Value::from("y_projection_fit_parameters"),
        parameters_map(&result.y_parameters),
    );
    tree.insert(Value::from("image"), image);
    Value::Mapping(tree)
}
