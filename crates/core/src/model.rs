//! Models and simulations: thin containers over packages.
//!
//! A model owns its packages and the dimension table that shapes their
//! arrays. Dimensions come from `dimensions` blocks (integer scalars such
//! as `nlay`, `nrow`, `ncol`, `maxbound`) and are refreshed after every
//! package load; `ncelldim` is derived from the discretization rather
//! than declared.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use mfio_spec::{DimensionResolver, Registry};

use crate::container::DataValue;
use crate::error::DataError;
use crate::package::Package;

pub struct Model {
    pub name: String,
    registry: Arc<Registry>,
    packages: Vec<Package>,
    dimensions: HashMap<String, i64>,
}

impl Model {
    pub fn new(registry: Arc<Registry>, name: &str) -> Model {
        Model {
            name: name.to_owned(),
            registry,
            packages: Vec::new(),
            dimensions: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn package_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.packages.iter_mut().find(|p| p.name == name)
    }

    /// Attach an already-built package, enforcing name uniqueness and the
    /// one-instance rule for non-multi package types.
    pub fn add_package(&mut self, package: Package) -> Result<(), DataError> {
        self.check_conflict(&package)?;
        self.packages.push(package);
        self.refresh_dimensions();
        Ok(())
    }

    /// Load a package file into this model. Dimensions declared in the
    /// file itself and the model's current table both shape the load; the
    /// table is refreshed afterwards so later packages see any dimensions
    /// the new one declares.
    pub fn load_package(
        &mut self,
        package_type: &str,
        name: &str,
        path: &Path,
    ) -> Result<&Package, DataError> {
        let snapshot = self.dimension_snapshot();
        let package = Package::load(&self.registry, package_type, name, path, &snapshot)?;
        self.check_conflict(&package)?;
        self.packages.push(package);
        self.refresh_dimensions();
        Ok(self.packages.last().ok_or_else(|| DataError::NoData {
            name: name.to_owned(),
        })?)
    }

    fn check_conflict(&self, package: &Package) -> Result<(), DataError> {
        for existing in &self.packages {
            let clash = existing.name == package.name
                || (existing.package_type == package.package_type
                    && !package.spec().multi_package);
            if clash {
                return Err(DataError::DuplicatePackage {
                    name: package.name.clone(),
                    package_type: package.package_type.clone(),
                });
            }
        }
        Ok(())
    }

    // ── Dimensions ──────────────────────────────────────────────────

    /// Rebuild the dimension table from every package's `dimensions`
    /// block. Integer scalars only; unset entries are skipped.
    pub fn refresh_dimensions(&mut self) {
        let mut dims = HashMap::new();
        let empty: HashMap<String, i64> = HashMap::new();
        for package in &self.packages {
            let Some(block_spec) = package.spec().block("dimensions") else {
                continue;
            };
            for structure in &block_spec.structures {
                let Ok(DataValue::Scalar(value)) =
                    package.get_data(&structure.name, None, &empty)
                else {
                    continue;
                };
                if let Some(n) = value.as_int() {
                    dims.insert(structure.name.clone(), n);
                }
            }
        }
        self.dimensions = dims;
    }

    /// Spatial coordinate count of a cellid: 3 for layered row/column
    /// grids, 1 for flat node numbering.
    fn derived_ncelldim(&self) -> Option<i64> {
        let has = |n: &str| self.dimensions.contains_key(n);
        if has("nlay") && has("nrow") && has("ncol") {
            Some(3)
        } else if has("nodes") {
            Some(1)
        } else {
            None
        }
    }

    /// Detached copy of the dimension table, including derived entries.
    /// Packages take this by reference during load and data access.
    pub fn dimension_snapshot(&self) -> HashMap<String, i64> {
        let mut dims = self.dimensions.clone();
        if !dims.contains_key("ncelldim") {
            if let Some(n) = self.derived_ncelldim() {
                dims.insert("ncelldim".to_owned(), n);
            }
        }
        dims
    }

    // ── Data access ─────────────────────────────────────────────────

    /// Read data from a named package under the model's dimensions.
    pub fn get_data(
        &self,
        package_name: &str,
        data_name: &str,
        period: Option<u32>,
    ) -> Result<DataValue, DataError> {
        let snapshot = self.dimension_snapshot();
        let package = self.package(package_name).ok_or_else(|| DataError::NoData {
            name: package_name.to_owned(),
        })?;
        package.get_data(data_name, period, &snapshot)
    }

    /// Write data into a named package, then refresh dimensions in case a
    /// dimension scalar changed.
    pub fn set_data(
        &mut self,
        package_name: &str,
        data_name: &str,
        period: Option<u32>,
        value: DataValue,
    ) -> Result<(), DataError> {
        let snapshot = self.dimension_snapshot();
        let package = self
            .package_mut(package_name)
            .ok_or_else(|| DataError::NoData {
                name: package_name.to_owned(),
            })?;
        package.set_data(data_name, period, value, &snapshot)?;
        self.refresh_dimensions();
        Ok(())
    }

    // ── Writing ─────────────────────────────────────────────────────

    /// Write every package back to its source path. Packages that were
    /// never loaded from disk must be given a path first.
    pub fn save_all(&self) -> Result<(), DataError> {
        let snapshot = self.dimension_snapshot();
        for package in &self.packages {
            let path = package.path.as_ref().ok_or_else(|| DataError::NoData {
                name: format!("{} (no file path assigned)", package.name),
            })?;
            package.write(path, &snapshot)?;
        }
        Ok(())
    }
}

impl DimensionResolver for Model {
    fn dimension(&self, name: &str) -> Option<i64> {
        if let Some(n) = self.dimensions.get(name) {
            return Some(*n);
        }
        if name == "ncelldim" {
            return self.derived_ncelldim();
        }
        None
    }
}

/// A set of models sharing one specification registry.
pub struct Simulation {
    registry: Arc<Registry>,
    models: Vec<Model>,
}

impl Simulation {
    pub fn new(registry: Arc<Registry>) -> Simulation {
        Simulation {
            registry,
            models: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn model_mut(&mut self, name: &str) -> Option<&mut Model> {
        self.models.iter_mut().find(|m| m.name == name)
    }

    /// Create and attach an empty model. Model names are unique within a
    /// simulation.
    pub fn add_model(&mut self, name: &str) -> Result<&mut Model, DataError> {
        if self.model(name).is_some() {
            return Err(DataError::DuplicatePackage {
                name: name.to_owned(),
                package_type: "model".to_owned(),
            });
        }
        self.models.push(Model::new(self.registry.clone(), name));
        self.models.last_mut().ok_or_else(|| DataError::NoData {
            name: name.to_owned(),
        })
    }

    /// Create a model and load a list of `(package_type, path)` pairs into
    /// it, in order. Package names default to the file stem. Which files
    /// make up a model is the caller's knowledge; nothing is discovered.
    pub fn load_model(
        &mut self,
        name: &str,
        packages: &[(&str, &Path)],
    ) -> Result<&Model, DataError> {
        self.add_model(name)?;
        let idx = self.models.len() - 1;
        for &(package_type, path) in packages {
            let pkg_name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(package_type)
                .to_owned();
            self.models[idx].load_package(package_type, &pkg_name, path)?;
        }
        Ok(&self.models[idx])
    }

    /// Write every model's packages back to their source paths.
    pub fn save_all(&self) -> Result<(), DataError> {
        for model in &self.models {
            model.save_all()?;
        }
        Ok(())
    }
}
