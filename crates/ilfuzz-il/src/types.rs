//! The JS type lattice (spec §3 "Type", §9 "Type lattice").
//!
//! A type is a pair of a base bitset (which concrete JS value categories it
//! may hold) and an optional extension carrying group/property/method/
//! signature refinements. Lattice operations obey standard subset rules;
//! `jsAnything` is top.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

bitflags::bitflags! {
    /// Base bitset of concrete JS value categories.
    #[derive(Serialize, Deserialize)]
    pub struct BaseType: u16 {
        const UNDEFINED   = 1 << 0;
        const INTEGER     = 1 << 1;
        const FLOAT       = 1 << 2;
        const BIGINT      = 1 << 3;
        const BOOLEAN     = 1 << 4;
        const STRING      = 1 << 5;
        const SYMBOL      = 1 << 6;
        const REGEXP      = 1 << 7;
        const ITERABLE    = 1 << 8;
        const OBJECT      = 1 << 9;
        const FUNCTION    = 1 << 10;
        const CONSTRUCTOR = 1 << 11;
        const NULL        = 1 << 12;

        const NOTHING = 0;
    }
}

/// Refinement of a type beyond its base bitset: which object group it
/// belongs to, which own properties/methods are known to exist, and (for
/// function/constructor types) a call signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TypeExtension {
    pub group: Option<Arc<str>>,
    pub properties: BTreeSet<Arc<str>>,
    pub methods: BTreeSet<Arc<str>>,
    pub signature: Option<Signature>,
    /// Wasm-specific refinement (numeric type width, reference type name);
    /// opaque to the JS type rules, carried only so Wasm operations (an
    /// extension point per spec §1) have somewhere to stash detail.
    pub wasm_refinement: Option<Arc<str>>,
}

impl TypeExtension {
    fn is_empty(&self) -> bool {
        self.group.is_none()
            && self.properties.is_empty()
            && self.methods.is_empty()
            && self.signature.is_none()
            && self.wasm_refinement.is_none()
    }

    fn merge(&self, other: &TypeExtension) -> Option<TypeExtension> {
        // Union keeps only refinements common to both branches/operands;
        // group identity must match exactly or is dropped.
        let group = if self.group == other.group {
            self.group.clone()
        } else {
            None
        };
        let properties: BTreeSet<_> = self
            .properties
            .intersection(&other.properties)
            .cloned()
            .collect();
        let methods: BTreeSet<_> = self
            .methods
            .intersection(&other.methods)
            .cloned()
            .collect();
        let signature = if self.signature == other.signature {
            self.signature.clone()
        } else {
            None
        };
        let wasm_refinement = if self.wasm_refinement == other.wasm_refinement {
            self.wasm_refinement.clone()
        } else {
            None
        };
        let ext = TypeExtension {
            group,
            properties,
            methods,
            signature,
            wasm_refinement,
        };
        if ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }

    fn intersect(&self, other: &TypeExtension) -> TypeExtension {
        TypeExtension {
            group: self.group.clone().or_else(|| other.group.clone()),
            properties: self.properties.union(&other.properties).cloned().collect(),
            methods: self.methods.union(&other.methods).cloned().collect(),
            signature: self.signature.clone().or_else(|| other.signature.clone()),
            wasm_refinement: self
                .wasm_refinement
                .clone()
                .or_else(|| other.wasm_refinement.clone()),
        }
    }

    fn is_subset_of(&self, other: &TypeExtension) -> bool {
        if let (Some(a), Some(b)) = (&self.group, &other.group) {
            if a != b {
                return false;
            }
        } else if other.group.is_some() {
            return false;
        }
        other.properties.is_subset(&self.properties)
            && other.methods.is_subset(&self.methods)
            && (other.signature.is_none() || other.signature == self.signature)
    }
}

/// A parameter in a function [`Signature`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parameter {
    Plain(ILType),
    Opt(ILType),
    Rest(ILType),
}

/// A function/constructor call signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Parameter>,
    pub return_type: Box<ILType>,
}

impl Signature {
    pub fn new(params: Vec<Parameter>, return_type: ILType) -> Self {
        Self {
            params,
            return_type: Box::new(return_type),
        }
    }

    /// The signature generators fall back to when nothing more specific is
    /// known: `(...jsAnything[]) -> jsAnything`.
    pub fn unknown() -> Self {
        Self::new(vec![Parameter::Rest(ILType::anything())], ILType::anything())
    }
}

/// `ILType = { base_bits, extension }` (spec §3).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ILType {
    pub base: BaseType,
    pub extension: Option<Box<TypeExtension>>,
}

impl fmt::Debug for ILType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.base)?;
        if let Some(ext) = &self.extension {
            if let Some(group) = &ext.group {
                write!(f, "<{}>", group)?;
            }
        }
        Ok(())
    }
}

impl ILType {
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            extension: None,
        }
    }

    pub fn with_extension(base: BaseType, extension: TypeExtension) -> Self {
        Self {
            base,
            extension: if extension.is_empty() {
                None
            } else {
                Some(Box::new(extension))
            },
        }
    }

    pub fn nothing() -> Self {
        Self::new(BaseType::NOTHING)
    }

    /// Top of the lattice: any JS value whatsoever.
    pub fn anything() -> Self {
        Self::new(BaseType::all())
    }

    pub fn undefined() -> Self {
        Self::new(BaseType::UNDEFINED)
    }

    pub fn null() -> Self {
        Self::new(BaseType::NULL)
    }

    pub fn integer() -> Self {
        Self::new(BaseType::INTEGER)
    }

    pub fn float() -> Self {
        Self::new(BaseType::FLOAT)
    }

    pub fn number() -> Self {
        Self::new(BaseType::INTEGER | BaseType::FLOAT)
    }

    pub fn bigint() -> Self {
        Self::new(BaseType::BIGINT)
    }

    pub fn boolean() -> Self {
        Self::new(BaseType::BOOLEAN)
    }

    pub fn string() -> Self {
        Self::new(BaseType::STRING)
    }

    pub fn symbol() -> Self {
        Self::new(BaseType::SYMBOL)
    }

    pub fn regexp() -> Self {
        Self::new(BaseType::REGEXP | BaseType::OBJECT)
    }

    pub fn object() -> Self {
        Self::new(BaseType::OBJECT)
    }

    pub fn object_with_group(group: impl Into<Arc<str>>) -> Self {
        Self::with_extension(
            BaseType::OBJECT,
            TypeExtension {
                group: Some(group.into()),
                ..Default::default()
            },
        )
    }

    pub fn function(signature: Signature) -> Self {
        Self::with_extension(
            BaseType::FUNCTION | BaseType::OBJECT,
            TypeExtension {
                signature: Some(signature),
                ..Default::default()
            },
        )
    }

    pub fn constructor(signature: Signature) -> Self {
        Self::with_extension(
            BaseType::CONSTRUCTOR | BaseType::FUNCTION | BaseType::OBJECT,
            TypeExtension {
                signature: Some(signature),
                ..Default::default()
            },
        )
    }

    pub fn is_nothing(&self) -> bool {
        self.base.is_empty() && self.extension.is_none()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.extension.as_ref().and_then(|e| e.signature.as_ref())
    }

    pub fn group(&self) -> Option<&str> {
        self.extension.as_ref().and_then(|e| e.group.as_deref())
    }

    /// `Is`: is every value of `self` necessarily a value of `other`?
    pub fn is(&self, other: &ILType) -> bool {
        if !other.base.contains(self.base) {
            return false;
        }
        match (&self.extension, &other.extension) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a.is_subset_of(b),
        }
    }

    /// `MayBe`: does `self` overlap with `other` at all?
    pub fn may_be(&self, other: &ILType) -> bool {
        self.base.intersects(other.base) || (self.base.is_empty() && other.base.is_empty())
    }

    /// Lattice union (`|`): the type holding either operand's values.
    pub fn union(&self, other: &ILType) -> ILType {
        let base = self.base | other.base;
        let extension = match (&self.extension, &other.extension) {
            (Some(a), Some(b)) => a.merge(b).map(Box::new),
            _ => None,
        };
        ILType { base, extension }
    }

    /// Lattice intersection.
    pub fn intersection(&self, other: &ILType) -> ILType {
        let base = self.base & other.base;
        let extension = match (&self.extension, &other.extension) {
            (Some(a), Some(b)) => {
                let merged = a.intersect(b);
                if merged.is_empty() {
                    None
                } else {
                    Some(Box::new(merged))
                }
            }
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        ILType { base, extension }
    }

    /// Merge-of-branches: used at control-flow joins. Identical to `union`
    /// except it also widens "defined on only one branch" to include
    /// `undefined`, which callers apply before calling this by unioning in
    /// `ILType::undefined()` for variables missing from a branch.
    pub fn merge_branch(&self, other: &ILType) -> ILType {
        self.union(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_commutative_on_base() {
        let a = ILType::integer();
        let b = ILType::string();
        assert_eq!(a.union(&b).base, b.union(&a).base);
    }

    #[test]
    fn is_subtype_of_anything() {
        assert!(ILType::integer().is(&ILType::anything()));
        assert!(ILType::object_with_group("Array").is(&ILType::object()));
        assert!(!ILType::object().is(&ILType::object_with_group("Array")));
    }

    #[test]
    fn guarded_property_access_unions_undefined() {
        let result = ILType::string().union(&ILType::undefined());
        assert!(result.base.contains(BaseType::STRING));
        assert!(result.base.contains(BaseType::UNDEFINED));
    }

    #[test]
    fn intersection_with_anything_is_identity_on_base() {
        let a = ILType::integer();
        assert_eq!(a.intersection(&ILType::anything()).base, a.base);
    }

    #[test]
    fn extension_merge_drops_divergent_group() {
        let a = ILType::object_with_group("Array");
        let b = ILType::object_with_group("Map");
        let merged = a.union(&b);
        assert!(merged.group().is_none());
    }
}
