//! Environment model: static registry of object groups, builtins,
//! interesting constants, and custom property/method name pools (spec §2
//! "Environment Model").
//!
//! Cyclic references (a builtin constructor referring to its own prototype
//! group) are late-bound lookups by name through this registry rather than
//! pointers, per spec §9 "Cyclic module references".

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::types::{ILType, Signature};

/// Description of one object "group" (the extension-level tag attached to
/// object types, e.g. `"Array"`, `"Map"`): its own properties, its own
/// methods (with signatures), and optionally which group its prototype
/// chain continues to.
#[derive(Debug, Clone, Default)]
pub struct ObjectGroup {
    pub name: Arc<str>,
    pub properties: FxHashMap<Arc<str>, ILType>,
    pub methods: FxHashMap<Arc<str>, Signature>,
    pub prototype_group: Option<Arc<str>>,
}

impl ObjectGroup {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<Arc<str>>, ty: ILType) -> Self {
        self.properties.insert(name.into(), ty);
        self
    }

    pub fn with_method(mut self, name: impl Into<Arc<str>>, sig: Signature) -> Self {
        self.methods.insert(name.into(), sig);
        self
    }
}

/// A registered recipe for generating the environment's builtins/groups. A
/// "profile" in spec vocabulary; engine-specific profiles are an external
/// concern (§1), this crate carries only [`MinimalProfile`].
pub trait Profile {
    fn name(&self) -> &str;
    fn register(&self, env: &mut Environment);
}

/// The static registry queried by the builder/generators for
/// `type_of(builtin)`, `type_of_property(name, base)`, method signatures,
/// and interesting literal pools.
#[derive(Debug, Default)]
pub struct Environment {
    groups: FxHashMap<Arc<str>, ObjectGroup>,
    builtins: FxHashMap<Arc<str>, ILType>,
    custom_property_names: Vec<Arc<str>>,
    custom_method_names: Vec<Arc<str>>,
    interesting_integers: Vec<i64>,
    interesting_floats: Vec<f64>,
    interesting_strings: Vec<Arc<str>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_group(&mut self, group: ObjectGroup) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn register_builtin(&mut self, name: impl Into<Arc<str>>, ty: ILType) {
        self.builtins.insert(name.into(), ty);
    }

    pub fn add_custom_property_name(&mut self, name: impl Into<Arc<str>>) {
        self.custom_property_names.push(name.into());
    }

    pub fn add_custom_method_name(&mut self, name: impl Into<Arc<str>>) {
        self.custom_method_names.push(name.into());
    }

    pub fn set_interesting_integers(&mut self, values: Vec<i64>) {
        self.interesting_integers = values;
    }

    pub fn set_interesting_floats(&mut self, values: Vec<f64>) {
        self.interesting_floats = values;
    }

    pub fn set_interesting_strings(&mut self, values: Vec<Arc<str>>) {
        self.interesting_strings = values;
    }

    pub fn group(&self, name: &str) -> Option<&ObjectGroup> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &ObjectGroup> {
        self.groups.values()
    }

    pub fn builtins(&self) -> impl Iterator<Item = (&str, &ILType)> {
        self.builtins.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn type_of(&self, builtin: &str) -> ILType {
        self.builtins
            .get(builtin)
            .cloned()
            .unwrap_or_else(ILType::anything)
    }

    /// `type_of_property(name, base)`: resolves a named property access
    /// against the base type's object group, walking the prototype chain by
    /// name (late-bound, per spec §9).
    pub fn type_of_property(&self, name: &str, base: &ILType) -> ILType {
        let mut group_name = base.group().map(|s| s.to_string());
        while let Some(g) = group_name {
            let Some(group) = self.groups.get(g.as_str()) else {
                break;
            };
            if let Some(ty) = group.properties.get(name) {
                return ty.clone();
            }
            group_name = group.prototype_group.as_ref().map(|s| s.to_string());
        }
        ILType::anything()
    }

    /// `type_of_method(name, base)`: as above, but for method signatures,
    /// used by `CallMethod` operations.
    pub fn type_of_method(&self, name: &str, base: &ILType) -> Option<Signature> {
        let mut group_name = base.group().map(|s| s.to_string());
        while let Some(g) = group_name {
            let group = self.groups.get(g.as_str())?;
            if let Some(sig) = group.methods.get(name) {
                return Some(sig.clone());
            }
            group_name = group.prototype_group.as_ref().map(|s| s.to_string());
        }
        None
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.custom_property_names.iter().map(|s| s.as_ref())
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.custom_method_names.iter().map(|s| s.as_ref())
    }

    pub fn interesting_integers(&self) -> &[i64] {
        &self.interesting_integers
    }

    pub fn interesting_floats(&self) -> &[f64] {
        &self.interesting_floats
    }

    pub fn interesting_strings(&self) -> &[Arc<str>] {
        &self.interesting_strings
    }

    pub fn apply(&mut self, profile: &dyn Profile) {
        profile.register(self);
    }
}

/// Default profile: the handful of ES builtins referenced by spec.md's
/// worked examples (§8 S1-S6), enough for the builder and generators to
/// have something concrete to generate against without depending on an
/// engine-specific profile crate (out of scope per §1).
pub struct MinimalProfile;

impl Profile for MinimalProfile {
    fn name(&self) -> &str {
        "minimal"
    }

    fn register(&self, env: &mut Environment) {
        env.register_builtin("Object", ILType::constructor(Signature::unknown()));
        env.register_builtin("Array", ILType::constructor(Signature::unknown()));
        env.register_builtin("Function", ILType::constructor(Signature::unknown()));
        env.register_builtin("Math", ILType::object_with_group("Math"));
        env.register_builtin("JSON", ILType::object_with_group("JSON"));
        env.register_builtin("Map", ILType::constructor(Signature::unknown()));
        env.register_builtin("Set", ILType::constructor(Signature::unknown()));
        env.register_builtin("Promise", ILType::constructor(Signature::unknown()));
        env.register_builtin("RegExp", ILType::constructor(Signature::unknown()));
        // Per Open Question (c): `now` belongs only on the `Date`
        // constructor's own call-signature/method table, not duplicated
        // onto instances of the `Date` group (older corpora registered it
        // twice; we register it exactly once, as a static method).
        env.register_builtin("Date", ILType::constructor(Signature::unknown()));

        let mut date_ctor_group = ObjectGroup::new("DateConstructor");
        date_ctor_group = date_ctor_group.with_method("now", Signature::new(vec![], ILType::number()));
        env.register_group(date_ctor_group);

        let array_group = ObjectGroup::new("Array")
            .with_property("length", ILType::integer())
            .with_method(
                "push",
                Signature::new(vec![crate::types::Parameter::Rest(ILType::anything())], ILType::integer()),
            )
            .with_method("pop", Signature::new(vec![], ILType::anything()))
            .with_method(
                "map",
                Signature::new(
                    vec![crate::types::Parameter::Plain(ILType::function(Signature::unknown()))],
                    ILType::object_with_group("Array"),
                ),
            )
            .with_method("join", Signature::new(vec![], ILType::string()));
        env.register_group(array_group);

        let map_group = ObjectGroup::new("Map")
            .with_method(
                "get",
                Signature::new(vec![crate::types::Parameter::Plain(ILType::anything())], ILType::anything()),
            )
            .with_method(
                "set",
                Signature::new(
                    vec![
                        crate::types::Parameter::Plain(ILType::anything()),
                        crate::types::Parameter::Plain(ILType::anything()),
                    ],
                    ILType::object_with_group("Map"),
                ),
            )
            .with_property("size", ILType::integer());
        env.register_group(map_group);

        for name in ["x", "y", "a", "b", "value", "data", "key", "index"] {
            env.add_custom_property_name(name);
        }
        for name in ["toString", "valueOf", "bind", "call", "apply"] {
            env.add_custom_method_name(name);
        }

        env.set_interesting_integers(vec![
            -1, 0, 1, 2, 10, 0x7fffffff_i64, -0x80000000_i64, i64::MAX,
        ]);
        env.set_interesting_floats(vec![0.0, -0.0, 1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);
        env.set_interesting_strings(vec![
            Arc::from(""),
            Arc::from("A"),
            Arc::from("0"),
            Arc::from("NaN"),
            Arc::from("undefined"),
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_lookup_walks_prototype_chain() {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        let array = ILType::object_with_group("Array");
        assert!(env.type_of_property("length", &array).is(&ILType::integer()));
    }

    #[test]
    fn unknown_property_falls_back_to_anything() {
        let env = Environment::new();
        let obj = ILType::object_with_group("Nonexistent");
        assert_eq!(env.type_of_property("whatever", &obj), ILType::anything());
    }

    #[test]
    fn date_now_is_only_a_static_method() {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        let date_instance = ILType::object_with_group("Date");
        assert!(env.type_of_method("now", &date_instance).is_none());
    }
}
