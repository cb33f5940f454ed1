//! The process-wide specification registry.
//!
//! [`Registry`] itself is a plain value type so tests and embedders can
//! build private instances. The process-wide instance is initialized once
//! through [`init`] and read through [`global`]; after a successful build
//! it is immutable, so concurrent readers need no locking discipline
//! beyond the `RwLock` used for the init-once handoff.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::dfn::parse_dfn;
use crate::error::SpecError;
use crate::tree::{BlockSpec, PackageSpec};

/// Read-only catalog of all known package specifications.
#[derive(Debug, Default)]
pub struct Registry {
    packages: HashMap<String, Arc<PackageSpec>>,
}

impl Registry {
    /// Build a registry from `(file_name, source_text)` definition pairs.
    /// Any malformed source fails the whole build.
    pub fn from_sources<I, S>(sources: I) -> Result<Registry, SpecError>
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut packages = HashMap::new();
        for (file, text) in sources {
            let spec = parse_dfn(text.as_ref(), file.as_ref())?;
            if packages.contains_key(&spec.package_type) {
                return Err(SpecError::parse(
                    file.as_ref(),
                    1,
                    format!("package type '{}' registered twice", spec.package_type),
                ));
            }
            packages.insert(spec.package_type.clone(), Arc::new(spec));
        }
        Ok(Registry { packages })
    }

    /// Shared handle to a package specification. Two packages of the same
    /// type always hold the identical `Arc`.
    pub fn get_package_spec(&self, package_type: &str) -> Result<Arc<PackageSpec>, SpecError> {
        let lower = package_type.to_ascii_lowercase();
        self.packages
            .get(&lower)
            .cloned()
            .ok_or_else(|| SpecError::unknown("package type", lower))
    }

    pub fn get_block_spec(
        &self,
        package_type: &str,
        block_name: &str,
    ) -> Result<BlockSpec, SpecError> {
        let spec = self.get_package_spec(package_type)?;
        spec.block(block_name)
            .cloned()
            .ok_or_else(|| SpecError::unknown("block", block_name.to_ascii_lowercase()))
    }

    pub fn package_types(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(|k| k.as_str())
    }
}

// ──────────────────────────────────────────────
// Process-wide instance
// ──────────────────────────────────────────────

fn global_slot() -> &'static RwLock<Option<Arc<Registry>>> {
    static SLOT: OnceLock<RwLock<Option<Arc<Registry>>>> = OnceLock::new();
    SLOT.get_or_init(|| RwLock::new(None))
}

/// Initialize the process-wide registry. Idempotent: the first successful
/// build wins and later calls return the existing instance untouched.
pub fn init<I, S>(sources: I) -> Result<Arc<Registry>, SpecError>
where
    I: IntoIterator<Item = (S, S)>,
    S: AsRef<str>,
{
    let slot = global_slot();
    {
        let guard = slot.read().expect("registry lock poisoned");
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
    }
    let built = Arc::new(Registry::from_sources(sources)?);
    let mut guard = slot.write().expect("registry lock poisoned");
    if let Some(existing) = guard.as_ref() {
        return Ok(existing.clone());
    }
    *guard = Some(built.clone());
    Ok(built)
}

/// The process-wide registry, if initialized.
pub fn global() -> Option<Arc<Registry>> {
    global_slot().read().expect("registry lock poisoned").clone()
}

/// Test-only reinitialization hook. Production paths never call this.
#[doc(hidden)]
pub fn reset() {
    *global_slot().write().expect("registry lock poisoned") = None;
}
