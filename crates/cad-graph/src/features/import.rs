//! Shape import from a file, dispatched on the (case-insensitive) file
//! extension.

use std::path::PathBuf;
use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::io::{read_shape, ShapeFormat};

use crate::feature::{Feature, FeatureCore, ShapeBundle};
use crate::feature::FeatureRef;

pub struct Import {
    core: FeatureCore,
    path: PathBuf,
}

impl Import {
    pub fn create(path: impl Into<PathBuf>) -> FeatureRef {
        let path = path.into();
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            path,
        });
        me.core
            .set_symbol_name(format!("import({})", me.path.display()));
        me
    }
}

impl Feature for Import {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Import"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_str(&self.path.to_string_lossy());
        // Identity follows the file content so a changed file is a changed
        // feature.
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let mut fh = HashAccumulator::new();
                fh.add_bytes(&bytes);
                h.add_hash(fh.finish());
            }
            Err(_) => h.add_str("<unreadable>"),
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        if !self.path.is_file() {
            return Err(CadError::invalid(
                "Import",
                format!("input file {} does not exist", self.path.display()),
            ));
        }
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let format = ShapeFormat::from_extension(ext).ok_or_else(|| {
            CadError::invalid(
                "Import",
                format!("unknown import file format (extension .{ext})"),
            )
        })?;
        let shape = read_shape(&self.path, format)
            .map_err(|e| CadError::geometry("Import", "read_shape", e.to_string()))?;
        Ok(ShapeBundle::new(shape))
    }
}
