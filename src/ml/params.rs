// ============================================================
// Layer 5 — Named Parameters
// ============================================================
// Moves learnable tensors between a burn module and a
// backend-independent ParamSnapshot keyed by dotted names:
//
//   inc.conv1.weight   → ParamTensor { shape: [32, 3, 3, 3], .. }
//   inc.conv1.bias     → ParamTensor { shape: [32], .. }
//   up1.weight         → ...
//
// Every network implements NamedParameters by walking its own
// fields with a prefix, so names follow the struct layout.
// Import checks every shape against the freshly built module
// and fails on the first missing or mismatched tensor.
//
// Whole-module export and import also compare the snapshot's
// scalar count with burn's `num_params()`, so a field the walk
// skips is an error rather than a silently lost weight.

use anyhow::{anyhow, bail, Result};
use burn::{
    module::Param,
    nn::conv::{Conv2d, ConvTranspose2d},
    prelude::*,
    tensor::TensorData,
};

use crate::domain::checkpoint::{parameter_count, ParamSnapshot, ParamTensor};

/// A module whose parameters can be exported and imported by name.
pub trait NamedParameters: Sized {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()>;

    fn import_params(self, prefix: &str, snapshot: &ParamSnapshot) -> Result<Self>;
}

/// Export a whole module into a new snapshot
pub fn snapshot_of<B, M>(module: &M) -> Result<ParamSnapshot>
where
    B: Backend,
    M: NamedParameters + Module<B>,
{
    let mut snapshot = ParamSnapshot::new();
    module.export_params("", &mut snapshot)?;
    check_coverage(module.num_params(), &snapshot)?;
    Ok(snapshot)
}

/// Import a whole module; the snapshot must cover it exactly.
pub fn restore_from<B, M>(module: M, snapshot: &ParamSnapshot) -> Result<M>
where
    B: Backend,
    M: NamedParameters + Module<B>,
{
    let restored = module.import_params("", snapshot)?;
    check_coverage(restored.num_params(), snapshot)?;
    Ok(restored)
}

fn check_coverage(expected: usize, snapshot: &ParamSnapshot) -> Result<()> {
    let found = parameter_count(snapshot);
    if found != expected {
        bail!("Snapshot holds {found} parameter values but the module has {expected}");
    }
    Ok(())
}

/// `prefix.name`, or just `name` at the root
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Copy a tensor to host memory as f32
pub fn export_tensor<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<ParamTensor> {
    let shape  = tensor.dims().to_vec();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read tensor data: {e:?}"))?;
    Ok(ParamTensor::new(shape, values))
}

/// Rebuild the tensor stored under `key` on the device of
/// `current`, which must have the same shape.
pub fn import_tensor<B: Backend, const D: usize>(
    snapshot: &ParamSnapshot,
    key:      &str,
    current:  &Tensor<B, D>,
) -> Result<Tensor<B, D>> {
    let stored = snapshot
        .get(key)
        .ok_or_else(|| anyhow!("Checkpoint has no parameter '{key}'"))?;

    let expected = current.dims().to_vec();
    if stored.shape != expected {
        bail!(
            "Parameter '{}' has shape {:?} in the checkpoint but {:?} in the model",
            key, stored.shape, expected
        );
    }
    if stored.values.len() != stored.numel() {
        bail!(
            "Parameter '{}' holds {} values for shape {:?}",
            key, stored.values.len(), stored.shape
        );
    }

    let data = TensorData::new(stored.values.clone(), stored.shape.clone());
    Ok(Tensor::from_data(data, &current.device()))
}

fn export_param<B: Backend, const D: usize>(
    param: &Param<Tensor<B, D>>,
    key:   String,
    out:   &mut ParamSnapshot,
) -> Result<()> {
    out.insert(key, export_tensor(param.val())?);
    Ok(())
}

fn import_param<B: Backend, const D: usize>(
    param:    Param<Tensor<B, D>>,
    key:      &str,
    snapshot: &ParamSnapshot,
) -> Result<Param<Tensor<B, D>>> {
    let tensor = import_tensor(snapshot, key, &param.val())?;
    Ok(Param::from_tensor(tensor))
}

// ─── Layer Implementations ────────────────────────────────────────────────────
impl<B: Backend> NamedParameters for Conv2d<B> {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()> {
        export_param(&self.weight, join(prefix, "weight"), out)?;
        if let Some(bias) = &self.bias {
            export_param(bias, join(prefix, "bias"), out)?;
        }
        Ok(())
    }

    fn import_params(mut self, prefix: &str, snapshot: &ParamSnapshot) -> Result<Self> {
        self.weight = import_param(self.weight, &join(prefix, "weight"), snapshot)?;
        self.bias = match self.bias.take() {
            Some(bias) => Some(import_param(bias, &join(prefix, "bias"), snapshot)?),
            None       => None,
        };
        Ok(self)
    }
}

impl<B: Backend> NamedParameters for ConvTranspose2d<B> {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()> {
        export_param(&self.weight, join(prefix, "weight"), out)?;
        if let Some(bias) = &self.bias {
            export_param(bias, join(prefix, "bias"), out)?;
        }
        Ok(())
    }

    fn import_params(mut self, prefix: &str, snapshot: &ParamSnapshot) -> Result<Self> {
        self.weight = import_param(self.weight, &join(prefix, "weight"), snapshot)?;
        self.bias = match self.bias.take() {
            Some(bias) => Some(import_param(bias, &join(prefix, "bias"), snapshot)?),
            None       => None,
        };
        Ok(self)
    }
}

impl<M: NamedParameters> NamedParameters for Vec<M> {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()> {
        for (i, module) in self.iter().enumerate() {
            module.export_params(&join(prefix, &i.to_string()), out)?;
        }
        Ok(())
    }

    fn import_params(self, prefix: &str, snapshot: &ParamSnapshot) -> Result<Self> {
        self.into_iter()
            .enumerate()
            .map(|(i, module)| module.import_params(&join(prefix, &i.to_string()), snapshot))
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::conv::Conv2dConfig;

    type TestBackend = NdArray;

    #[test]
    fn test_join_skips_empty_prefix() {
        assert_eq!(join("", "weight"), "weight");
        assert_eq!(join("down1.conv1", "weight"), "down1.conv1.weight");
    }

    #[test]
    fn test_conv_export_names_weight_and_bias() {
        let device = Default::default();
        let conv: Conv2d<TestBackend> = Conv2dConfig::new([3, 4], [3, 3]).init(&device);

        let mut snapshot = ParamSnapshot::new();
        conv.export_params("inc", &mut snapshot).unwrap();

        assert_eq!(snapshot["inc.weight"].shape, vec![4, 3, 3, 3]);
        assert_eq!(snapshot["inc.bias"].shape, vec![4]);
        assert_eq!(snapshot["inc.weight"].values.len(), 108);
    }

    #[test]
    fn test_conv_import_restores_exported_values() {
        let device = Default::default();
        let source: Conv2d<TestBackend> = Conv2dConfig::new([2, 2], [1, 1]).init(&device);
        let target: Conv2d<TestBackend> = Conv2dConfig::new([2, 2], [1, 1]).init(&device);

        let exported = snapshot_of::<TestBackend, _>(&source).unwrap();
        let restored = restore_from::<TestBackend, _>(target, &exported).unwrap();

        assert_eq!(snapshot_of::<TestBackend, _>(&restored).unwrap(), exported);
    }

    #[test]
    fn test_import_rejects_shape_mismatch() {
        let device = Default::default();
        let small: Conv2d<TestBackend> = Conv2dConfig::new([2, 2], [1, 1]).init(&device);
        let large: Conv2d<TestBackend> = Conv2dConfig::new([2, 5], [1, 1]).init(&device);

        let exported = snapshot_of::<TestBackend, _>(&small).unwrap();
        let err = large.import_params("", &exported).unwrap_err();
        assert!(err.to_string().contains("shape"));
    }

    #[test]
    fn test_import_rejects_missing_parameter() {
        let device = Default::default();
        let conv: Conv2d<TestBackend> = Conv2dConfig::new([2, 2], [1, 1]).init(&device);

        let err = conv.import_params("", &ParamSnapshot::new()).unwrap_err();
        assert!(err.to_string().contains("no parameter 'weight'"));
    }

    #[test]
    fn test_restore_rejects_extra_parameters() {
        let device = Default::default();
        let conv: Conv2d<TestBackend> = Conv2dConfig::new([2, 2], [1, 1]).init(&device);

        let mut snapshot = snapshot_of::<TestBackend, _>(&conv).unwrap();
        snapshot.insert("stray.weight".to_string(), ParamTensor::new(vec![2], vec![0.0, 1.0]));

        let err = restore_from::<TestBackend, _>(conv, &snapshot).unwrap_err();
        assert!(err.to_string().contains("the module has 6"));
    }

    #[test]
    fn test_partial_walk_is_detected() {
        let device = Default::default();
        let conv: Conv2d<TestBackend> = Conv2dConfig::new([2, 2], [1, 1]).init(&device);

        // weight only, as if the walk forgot the bias
        let mut snapshot = ParamSnapshot::new();
        snapshot.insert("weight".to_string(), export_tensor(conv.weight.val()).unwrap());

        assert!(check_coverage(conv.num_params(), &snapshot).is_err());
    }
}
