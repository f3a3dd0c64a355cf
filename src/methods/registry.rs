use crate::domain::model::DirectoryListing;
use crate::domain::ports::MethodAdapter;
use crate::methods::{Busted, Cfel, Fel, Meme, Prime, Relax};
use crate::utils::error::{EtlError, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A method result file located for one gene.
#[derive(Clone)]
pub struct ResolvedMethod {
    pub adapter: Arc<dyn MethodAdapter>,
    pub path: PathBuf,
}

impl std::fmt::Debug for ResolvedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedMethod")
            .field("method", &self.adapter.name())
            .field("path", &self.path)
            .finish()
    }
}

/// Ordered set of method adapters. Registration order is processing order.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: Vec<Arc<dyn MethodAdapter>>,
    directories: HashMap<String, String>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// BUSTED, RELAX, CFEL, FEL, MEME, PRIME.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Busted));
        registry.register(Arc::new(Relax));
        registry.register(Arc::new(Cfel));
        registry.register(Arc::new(Fel));
        registry.register(Arc::new(Meme));
        registry.register(Arc::new(Prime));
        registry
    }

    /// Overrides result directories by method name.
    pub fn with_directories(mut self, overrides: HashMap<String, String>) -> Self {
        self.directories.extend(overrides);
        self
    }

    /// Registers an adapter; a later registration under the same name replaces
    /// the earlier one in place.
    pub fn register(&mut self, adapter: Arc<dyn MethodAdapter>) {
        match self.methods.iter_mut().find(|m| m.name() == adapter.name()) {
            Some(slot) => *slot = adapter,
            None => self.methods.push(adapter),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MethodAdapter>> {
        self.methods.iter().find(|m| m.name() == name).cloned()
    }

    pub fn methods(&self) -> &[Arc<dyn MethodAdapter>] {
        &self.methods
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn directory_for<'a>(&'a self, adapter: &'a dyn MethodAdapter) -> &'a str {
        self.directories
            .get(adapter.name())
            .map(String::as_str)
            .unwrap_or_else(|| adapter.directory())
    }

    fn file_name(gene: &str, adapter: &dyn MethodAdapter) -> String {
        format!("{}.{}", gene, adapter.file_suffix())
    }

    /// Every method with a result file for `gene`, in registry order.
    pub fn resolve_for_file(
        &self,
        gene: &str,
        root: &Path,
        listing: &DirectoryListing,
    ) -> Vec<ResolvedMethod> {
        self.methods
            .iter()
            .filter_map(|adapter| {
                let directory = self.directory_for(adapter.as_ref());
                let file = Self::file_name(gene, adapter.as_ref());
                listing
                    .get(directory)
                    .filter(|files| files.contains(&file))
                    .map(|_| ResolvedMethod {
                        adapter: Arc::clone(adapter),
                        path: root.join(directory).join(&file),
                    })
            })
            .collect()
    }

    /// Sorted union of gene names across all method directories.
    pub fn discover_genes(&self, listing: &DirectoryListing) -> Vec<String> {
        let mut genes = BTreeSet::new();
        for adapter in &self.methods {
            let Some(files) = listing.get(self.directory_for(adapter.as_ref())) else {
                continue;
            };
            let suffix = format!(".{}", adapter.file_suffix());
            genes.extend(
                files
                    .iter()
                    .filter_map(|file| file.strip_suffix(&suffix))
                    .filter(|gene| !gene.is_empty())
                    .map(str::to_string),
            );
        }
        genes.into_iter().collect()
    }

    /// Lists every method directory under `root` once. Missing method
    /// directories are skipped; a missing root is an error.
    pub async fn scan_directory(&self, root: &Path) -> Result<DirectoryListing> {
        let metadata = tokio::fs::metadata(root).await?;
        if !metadata.is_dir() {
            return Err(EtlError::ConfigValidationError {
                field: "results_path".to_string(),
                message: format!("{} is not a directory", root.display()),
            });
        }

        let mut listing = DirectoryListing::new();
        for adapter in &self.methods {
            let directory = self.directory_for(adapter.as_ref());
            if listing.contains_key(directory) {
                continue;
            }
            let path = root.join(directory);
            if !tokio::fs::try_exists(&path).await? {
                debug!("📂 No {} directory at {}", adapter.name(), path.display());
                continue;
            }

            let mut files = BTreeSet::new();
            let mut entries = tokio::fs::read_dir(&path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    files.insert(entry.file_name().to_string_lossy().into_owned());
                }
            }
            debug!("📂 {}: {} files", directory, files.len());
            listing.insert(directory.to_string(), files);
        }

        Ok(listing)
    }

    fn union_of<F>(&self, fields: F) -> Vec<String>
    where
        F: Fn(&dyn MethodAdapter) -> Vec<&'static str>,
    {
        let mut union: Vec<String> = Vec::new();
        for adapter in &self.methods {
            for field in fields(adapter.as_ref()) {
                if !union.iter().any(|f| f == field) {
                    union.push(field.to_string());
                }
            }
        }
        union
    }

    pub fn summary_fields(&self) -> Vec<String> {
        self.union_of(|m| m.summary_fields())
    }

    pub fn site_fields(&self) -> Vec<String> {
        self.union_of(|m| m.site_fields())
    }

    pub fn comparison_summary_fields(&self) -> Vec<String> {
        self.union_of(|m| m.comparison_summary_fields())
    }

    pub fn comparison_site_fields(&self) -> Vec<String> {
        self.union_of(|m| m.comparison_site_fields())
    }
}
