//! Resolution of document types and partition keys to physical collection names.
//!
//! A document type is bound to a collection either by convention (the pluralized,
//! camel-cased type name) or by an explicit override. When a partition key is supplied
//! the physical name is `"{partition_key}-{name}"`. Resolution is a pure function of its
//! inputs and never creates anything in the store.

use std::{any::type_name, borrow::Cow};

use crate::{backend::StoreBackend, document::Document};

/// Separator placed between the partition key and the collection name.
pub const PARTITION_SEPARATOR: char = '-';

/// The naming inputs of a document type: its Rust type name and an optional override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    /// The unqualified type name, without generic arguments.
    pub type_name: &'static str,
    /// An explicit collection name replacing the convention.
    pub name_override: Option<&'static str>,
}

impl CollectionDescriptor {
    /// Captures the naming inputs of `D`.
    pub fn of<D: Document>() -> Self {
        Self {
            type_name: short_type_name(type_name::<D>()),
            name_override: D::collection_name_override(),
        }
    }

    /// Returns the logical (unpartitioned) collection name.
    pub fn collection_name(&self) -> Cow<'static, str> {
        match self.name_override {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(camelize(&pluralize(self.type_name))),
        }
    }
}

/// Resolves a descriptor and an optional partition key to a physical collection name.
///
/// An empty partition key is treated as absent.
pub fn resolve(descriptor: &CollectionDescriptor, partition_key: Option<&str>) -> String {
    let name = descriptor.collection_name();

    match partition_key.filter(|key| !key.is_empty()) {
        Some(key) => format!("{key}{PARTITION_SEPARATOR}{name}"),
        None => name.into_owned(),
    }
}

/// Resolves the physical collection name for `D`.
pub fn collection_name_for<D: Document>(partition_key: Option<&str>) -> String {
    resolve(&CollectionDescriptor::of::<D>(), partition_key)
}

/// A resolved collection bound to a backend.
///
/// Handles are cheap to create; nothing is cached and nothing is created remotely.
#[derive(Debug)]
pub struct CollectionHandle<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> CollectionHandle<'a, B> {
    /// Resolves the collection for `D` under the given partition key.
    pub fn resolve<D: Document>(backend: &'a B, partition_key: Option<&str>) -> Self {
        Self {
            name: collection_name_for::<D>(partition_key),
            backend,
        }
    }

    /// Returns the physical name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the backend this collection lives in.
    pub fn backend(&self) -> &'a B {
        self.backend
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let without_generics = full.split('<').next().unwrap_or(full);

    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// Pluralizes an English noun with the common suffix rules.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();

    if let Some(stem) = word.strip_suffix(['y', 'Y']) {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if matches!(before, Some(c) if !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }

    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        return format!("{word}es");
    }

    format!("{word}s")
}

/// Lowercases the first character of a name.
pub fn camelize(word: &str) -> String {
    let mut chars = word.chars();

    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
