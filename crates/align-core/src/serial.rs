//! JSON-friendly representation of dense `f64` arrays.
//!
//! JSON has no NaN or infinity: NaN is written as `null`, infinities as the
//! strings `"inf"` and `"-inf"`, so every value reads back unchanged.

use ndarray::{Array, ArrayD, Dimension, IxDyn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AlignError, Result};

/// One `f64` in its JSON form. NaN compares equal to NaN.
#[derive(Debug, Clone, Copy)]
pub struct JsonFloat(pub f64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum FloatRepr {
    Number(f64),
    Infinite(Infinity),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum Infinity {
    #[serde(rename = "inf")]
    Positive,
    #[serde(rename = "-inf")]
    Negative,
}

impl JsonFloat {
    fn repr(self) -> Option<FloatRepr> {
        let v = self.0;
        if v.is_nan() {
            None
        } else if v == f64::INFINITY {
            Some(FloatRepr::Infinite(Infinity::Positive))
        } else if v == f64::NEG_INFINITY {
            Some(FloatRepr::Infinite(Infinity::Negative))
        } else {
            Some(FloatRepr::Number(v))
        }
    }

    fn from_repr(repr: Option<FloatRepr>) -> Self {
        JsonFloat(match repr {
            None => f64::NAN,
            Some(FloatRepr::Number(v)) => v,
            Some(FloatRepr::Infinite(Infinity::Positive)) => f64::INFINITY,
            Some(FloatRepr::Infinite(Infinity::Negative)) => f64::NEG_INFINITY,
        })
    }
}

impl Serialize for JsonFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.repr().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Option::<FloatRepr>::deserialize(deserializer).map(JsonFloat::from_repr)
    }
}

impl PartialEq for JsonFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 || (self.0.is_nan() && other.0.is_nan())
    }
}

impl PartialEq<f64> for JsonFloat {
    fn eq(&self, other: &f64) -> bool {
        self.0 == *other
    }
}

/// Row-major array snapshot: `shape` plus flattened `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseArray {
    pub shape: Vec<usize>,
    pub data: Vec<JsonFloat>,
}

impl DenseArray {
    /// Capture any `ndarray` array in logical (row-major) order.
    pub fn from_array<D: Dimension>(array: &Array<f64, D>) -> Self {
        DenseArray {
            shape: array.shape().to_vec(),
            data: array.iter().map(|&v| JsonFloat(v)).collect(),
        }
    }

    /// Rebuild a dynamic-dimensional array.
    pub fn to_array(&self) -> Result<ArrayD<f64>> {
        let values: Vec<f64> = self.data.iter().map(|v| v.0).collect();
        ArrayD::from_shape_vec(IxDyn(&self.shape), values)
            .map_err(|e| AlignError::ShapeMismatch(format!("{:?}: {}", self.shape, e)))
    }

    /// Rebuild an array of a fixed dimensionality, e.g. `Ix2`.
    pub fn to_array_dim<D: Dimension>(&self) -> Result<Array<f64, D>> {
        self.to_array()?
            .into_dimensionality::<D>()
            .map_err(|e| AlignError::ShapeMismatch(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Ix2};

    #[test]
    fn test_nan_written_as_null() {
        let a = array![[1.0, f64::NAN], [3.0, 4.5]];
        let dense = DenseArray::from_array(&a);
        let json = serde_json::to_string(&dense).unwrap();
        assert_eq!(json, r#"{"shape":[2,2],"data":[1.0,null,3.0,4.5]}"#);

        let back: DenseArray = serde_json::from_str(&json).unwrap();
        let restored = back.to_array_dim::<Ix2>().unwrap();
        assert_eq!(restored[[1, 1]], 4.5);
        assert!(restored[[0, 1]].is_nan());
    }

    #[test]
    fn test_infinities_keep_their_sign() {
        let a = array![f64::INFINITY, -1.0, f64::NEG_INFINITY];
        let json = serde_json::to_string(&DenseArray::from_array(&a)).unwrap();
        assert_eq!(json, r#"{"shape":[3],"data":["inf",-1.0,"-inf"]}"#);

        let back: DenseArray = serde_json::from_str(&json).unwrap();
        let restored = back.to_array().unwrap();
        assert_eq!(restored[[0]], f64::INFINITY);
        assert_eq!(restored[[2]], f64::NEG_INFINITY);
    }

    #[test]
    fn test_unknown_string_rejected() {
        let parsed: std::result::Result<DenseArray, _> =
            serde_json::from_str(r#"{"shape":[1],"data":["nan"]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_row_major_order_for_transposed_views() {
        let a = array![[1.0, 2.0], [3.0, 4.0]].reversed_axes();
        let dense = DenseArray::from_array(&a);
        assert_eq!(dense.data, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_bad_shape_rejected() {
        let dense = DenseArray {
            shape: vec![2, 3],
            data: vec![JsonFloat(1.0); 5],
        };
        assert!(matches!(dense.to_array(), Err(AlignError::ShapeMismatch(_))));
    }
}
