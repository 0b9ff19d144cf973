//! The registry of kinds, layouts, conversions and defaulters.
//!
//! A [`Scheme`] is assembled once at startup, usually through a
//! [`SchemeBuilder`], and then shared read-only behind an `Arc`.
use std::{
    any::Any,
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    panic::Location,
    sync::{Arc, OnceLock},
};

use apimachinery_core::{
    gvk::{DisabledGroupVersioner, GroupVersions, InternalGroupVersioner, MultiGroupVersioner},
    reflect::{FromValue, ToValue},
    GroupVersion, GroupVersionKind, GroupVersioner, Layout, Object,
};

use crate::{
    conversion::{Converter, Scope},
    error::{Error, NotRegisteredError, Result},
    unstructured::{from_unstructured, to_unstructured},
};

mod builder;
pub mod meta;
pub use builder::SchemeBuilder;

/// Reports the kinds an object is registered under.
pub trait ObjectTyper: Send + Sync {
    /// Every kind the object's layout is registered as, and whether it is unversioned
    fn object_kinds(&self, obj: &dyn Object) -> Result<(Vec<GroupVersionKind>, bool)>;

    /// Whether a kind can be constructed
    fn recognizes(&self, gvk: &GroupVersionKind) -> bool;
}

/// Constructs empty objects for a kind.
pub trait ObjectCreater: Send + Sync {
    /// A zero value of the layout registered for `gvk`
    fn new_object(&self, gvk: &GroupVersionKind) -> Result<Box<dyn Object>>;
}

/// Converts objects between layouts and versions.
pub trait ObjectConvertor: Send + Sync {
    /// Convert `src` into `dst`, passing an opaque context to conversion functions
    fn convert(&self, src: &dyn Object, dst: &mut dyn Object, context: Option<&dyn Any>) -> Result<()>;

    /// Convert a copy of `obj` to the version chosen by `target`
    fn convert_to_version(&self, obj: &dyn Object, target: &dyn GroupVersioner) -> Result<Box<dyn Object>>;

    /// Convert `obj` to the version chosen by `target`, reusing it where possible
    fn unsafe_convert_to_version(
        &self,
        obj: Box<dyn Object>,
        target: &dyn GroupVersioner,
    ) -> Result<Box<dyn Object>>;

    /// Translate a field selector from an external version to its internal form
    fn convert_field_label(&self, gvk: &GroupVersionKind, label: &str, value: &str) -> Result<(String, String)>;
}

/// Fills in default values.
pub trait ObjectDefaulter: Send + Sync {
    /// Apply the defaulting function registered for the object's layout, if any
    fn default_object(&self, obj: &mut dyn Object);
}

type Constructor = fn() -> Box<dyn Object>;
type DefaulterFn = Arc<dyn Fn(&mut dyn Object) + Send + Sync>;
type FieldLabelFn = Arc<dyn Fn(&str, &str) -> Result<(String, String)> + Send + Sync>;

fn construct<T: Object + Default>() -> Box<dyn Object> {
    Box::new(T::default())
}

fn register_self_conversion<T: Object + Clone>(converter: &mut Converter) {
    converter.add_generated_conversion_func(|src: &T, dst: &mut T, _: &Scope<'_>| {
        *dst = src.clone();
        dst.set_group_version_kind(&GroupVersionKind::default());
        Ok(())
    });
}

/// A layout that can be registered with a [`Scheme`].
#[derive(Clone, Copy)]
pub struct KnownType {
    layout: Layout,
    new: Constructor,
    self_conversion: fn(&mut Converter),
}

impl KnownType {
    /// Describe the layout of `T`
    pub fn of<T: Object + Default + Clone>() -> Self {
        Self {
            layout: Layout::of::<T>(),
            new: construct::<T>,
            self_conversion: register_self_conversion::<T>,
        }
    }

    /// The described layout
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The kind this layout registers under by default: its type name
    pub fn kind(&self) -> &'static str {
        self.layout.short_name()
    }
}

impl fmt::Debug for KnownType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KnownType").field(&self.layout).finish()
    }
}

/// Maps kinds to layouts and back, and owns the conversion and defaulting
/// functions between them.
pub struct Scheme {
    gvk_to_type: HashMap<GroupVersionKind, Layout>,
    type_to_gvk: HashMap<Layout, Vec<GroupVersionKind>>,
    constructors: HashMap<Layout, Constructor>,
    unversioned_types: HashMap<Layout, GroupVersionKind>,
    unversioned_kinds: HashMap<String, Layout>,
    field_label_conversion_funcs: HashMap<GroupVersionKind, FieldLabelFn>,
    defaulter_funcs: HashMap<Layout, DefaulterFn>,
    converter: Converter,
    version_priority: BTreeMap<String, Vec<String>>,
    observed_versions: Vec<GroupVersion>,
    scheme_name: String,
}

impl fmt::Debug for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheme")
            .field("name", &self.scheme_name)
            .field("kinds", &self.gvk_to_type.len())
            .field("observed_versions", &self.observed_versions)
            .finish()
    }
}

enum Input<'a> {
    Borrowed(&'a dyn Object),
    Owned(Box<dyn Object>),
}

impl Input<'_> {
    fn as_object(&self) -> &dyn Object {
        match self {
            Input::Borrowed(obj) => *obj,
            Input::Owned(obj) => obj.as_ref(),
        }
    }

    fn into_owned(self) -> Box<dyn Object> {
        match self {
            Input::Borrowed(obj) => obj.deep_copy_object(),
            Input::Owned(obj) => obj,
        }
    }
}

fn set_target_kind(mut obj: Box<dyn Object>, gvk: &GroupVersionKind) -> Box<dyn Object> {
    if gvk.is_internal() {
        obj.set_group_version_kind(&GroupVersionKind::default());
    } else {
        obj.set_group_version_kind(gvk);
    }
    obj
}

/// Extract a versioner from a conversion context.
///
/// Any of the versioners from `apimachinery_core::gvk`, or an
/// `Arc<dyn GroupVersioner>`, is accepted.
pub fn versioner_from_context(context: &dyn Any) -> Option<&dyn GroupVersioner> {
    if let Some(v) = context.downcast_ref::<Arc<dyn GroupVersioner>>() {
        return Some(v.as_ref());
    }
    if let Some(v) = context.downcast_ref::<GroupVersion>() {
        return Some(v);
    }
    if let Some(v) = context.downcast_ref::<GroupVersions>() {
        return Some(v);
    }
    if let Some(v) = context.downcast_ref::<InternalGroupVersioner>() {
        return Some(v);
    }
    if let Some(v) = context.downcast_ref::<MultiGroupVersioner>() {
        return Some(v);
    }
    if let Some(v) = context.downcast_ref::<DisabledGroupVersioner>() {
        return Some(v);
    }
    None
}

/// Field selector conversion every kind supports: name and namespace, unchanged.
pub fn default_meta_field_selector_conversion(label: &str, value: &str) -> Result<(String, String)> {
    match label {
        "metadata.name" | "metadata.namespace" => Ok((label.to_string(), value.to_string())),
        _ => Err(Error::BadRequest(format!(
            "{label:?} is not a known field selector: only \"metadata.name\", \"metadata.namespace\""
        ))),
    }
}

impl Scheme {
    /// An empty scheme named after the calling location
    #[track_caller]
    pub fn new() -> Self {
        let caller = Location::caller();
        Self::with_name(format!("{}:{}", caller.file(), caller.line()))
    }

    /// An empty scheme with an explicit name, used in error messages
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            gvk_to_type: HashMap::new(),
            type_to_gvk: HashMap::new(),
            constructors: HashMap::new(),
            unversioned_types: HashMap::new(),
            unversioned_kinds: HashMap::new(),
            field_label_conversion_funcs: HashMap::new(),
            defaulter_funcs: HashMap::new(),
            converter: Converter::new(),
            version_priority: BTreeMap::new(),
            observed_versions: Vec::new(),
            scheme_name: name.into(),
        }
    }

    /// The name of the scheme
    pub fn name(&self) -> &str {
        &self.scheme_name
    }

    /// The converter holding this scheme's conversion functions
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    fn add_observed_version(&mut self, gv: &GroupVersion) {
        if gv.version.is_empty() || gv.version == apimachinery_core::INTERNAL_VERSION {
            return;
        }
        if !self.observed_versions.contains(gv) {
            self.observed_versions.push(gv.clone());
        }
    }

    /// Register `T` under `gv`, with its type name as the kind.
    ///
    /// # Panics
    /// See [`Scheme::add_known_type_with_name`].
    pub fn add_known_type<T: Object + Default + Clone>(&mut self, gv: &GroupVersion) -> &mut Self {
        self.add_known_types(gv, [KnownType::of::<T>()])
    }

    /// Register several layouts under `gv`, each under its type name.
    ///
    /// # Panics
    /// See [`Scheme::add_known_type_with_name`].
    pub fn add_known_types(
        &mut self,
        gv: &GroupVersion,
        types: impl IntoIterator<Item = KnownType>,
    ) -> &mut Self {
        self.add_observed_version(gv);
        for known in types {
            self.add_known_type_with_name(gv.with_kind(known.kind()), known);
        }
        self
    }

    /// Register a layout under an explicit kind.
    ///
    /// A generated self-conversion (deep copy that clears the type fields) is
    /// registered alongside.
    ///
    /// # Panics
    /// Panics when the version is empty, or when `gvk` is already registered
    /// to a different layout.
    pub fn add_known_type_with_name(&mut self, gvk: GroupVersionKind, known: KnownType) -> &mut Self {
        self.add_observed_version(&gvk.group_version());
        let layout = known.layout;
        if gvk.version.is_empty() {
            panic!("version is required on all types: {gvk} {layout}");
        }
        if let Some(old) = self.gvk_to_type.get(&gvk) {
            if *old != layout {
                panic!(
                    "double registration of different types for {gvk}: old={old}, new={layout} in scheme {:?}",
                    self.scheme_name
                );
            }
        }
        self.gvk_to_type.insert(gvk.clone(), layout);
        self.constructors.insert(layout, known.new);
        let kinds = self.type_to_gvk.entry(layout).or_default();
        if kinds.contains(&gvk) {
            return self;
        }
        kinds.push(gvk);
        (known.self_conversion)(&mut self.converter);
        self
    }

    /// Register layouts whose kinds carry the same meaning in every group version.
    ///
    /// Unversioned kinds are also looked up by kind name alone.
    ///
    /// # Panics
    /// Panics when a kind name is already taken by another unversioned layout.
    pub fn add_unversioned_types(
        &mut self,
        gv: &GroupVersion,
        types: impl IntoIterator<Item = KnownType>,
    ) -> &mut Self {
        let types = types.into_iter().collect::<Vec<_>>();
        self.add_known_types(gv, types.iter().copied());
        for known in types {
            let gvk = gv.with_kind(known.kind());
            if let Some(old) = self.unversioned_kinds.get(&gvk.kind) {
                if *old != known.layout {
                    panic!(
                        "{old} has already been registered as unversioned kind {:?} - kind name must be unique in scheme {:?}",
                        gvk.kind, self.scheme_name
                    );
                }
            }
            self.unversioned_kinds.insert(gvk.kind.clone(), known.layout);
            self.unversioned_types.insert(known.layout, gvk);
        }
        self
    }

    /// Every kind registered in `gv`, with its layout
    pub fn known_types(&self, gv: &GroupVersion) -> BTreeMap<String, Layout> {
        self.gvk_to_type
            .iter()
            .filter(|(gvk, _)| gvk.group == gv.group && gvk.version == gv.version)
            .map(|(gvk, layout)| (gvk.kind.clone(), *layout))
            .collect()
    }

    /// Every registered kind, with its layout
    pub fn all_known_types(&self) -> &HashMap<GroupVersionKind, Layout> {
        &self.gvk_to_type
    }

    /// Every kind an object can be, and whether it is unversioned.
    ///
    /// Unstructured objects report the kind they declare.
    pub fn object_kinds(&self, obj: &dyn Object) -> Result<(Vec<GroupVersionKind>, bool)> {
        if obj.is_unstructured() {
            let gvk = obj.group_version_kind();
            if gvk.kind.is_empty() {
                return Err(Error::MissingKind {
                    data: "unstructured object has no kind".into(),
                });
            }
            if gvk.version.is_empty() {
                return Err(Error::MissingVersion {
                    data: "unstructured object has no version".into(),
                });
            }
            return Ok((vec![gvk], false));
        }
        let layout = obj.layout();
        match self.type_to_gvk.get(&layout) {
            Some(kinds) if !kinds.is_empty() => {
                Ok((kinds.clone(), self.unversioned_types.contains_key(&layout)))
            }
            _ => Err(self.not_registered_type(layout)),
        }
    }

    /// Whether a kind is registered
    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.gvk_to_type.contains_key(gvk)
    }

    /// Whether an object is unversioned, and whether its layout is registered at all
    pub fn is_unversioned(&self, obj: &dyn Object) -> (bool, bool) {
        let layout = obj.layout();
        if self.unversioned_types.contains_key(&layout) {
            return (true, true);
        }
        (false, self.type_to_gvk.contains_key(&layout))
    }

    /// Construct a zero value for `gvk`.
    ///
    /// Unversioned kinds are found in every group version.
    pub fn new_object(&self, gvk: &GroupVersionKind) -> Result<Box<dyn Object>> {
        let layout = self
            .gvk_to_type
            .get(gvk)
            .or_else(|| self.unversioned_kinds.get(&gvk.kind))
            .ok_or_else(|| NotRegisteredError::Kind {
                gvk: gvk.clone(),
                scheme: self.scheme_name.clone(),
            })?;
        match self.constructors.get(layout) {
            Some(new) => Ok(new()),
            None => Err(self.not_registered_type(*layout)),
        }
    }

    fn not_registered_type(&self, layout: Layout) -> Error {
        NotRegisteredError::Type {
            type_name: layout.name().to_string(),
            scheme: self.scheme_name.clone(),
        }
        .into()
    }

    /// Register a conversion function between two layouts
    pub fn add_conversion_func<A: Any, B: Any>(
        &mut self,
        f: impl Fn(&A, &mut B, &Scope<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.converter.add_conversion_func(f);
        self
    }

    /// Register a generated conversion function, used when no explicit one exists
    pub fn add_generated_conversion_func<A: Any, B: Any>(
        &mut self,
        f: impl Fn(&A, &mut B, &Scope<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.converter.add_generated_conversion_func(f);
        self
    }

    /// Make conversions from `A` to `B` a no-op
    pub fn add_ignored_conversion_type<A: Any, B: Any>(&mut self) -> &mut Self {
        self.converter.register_ignored_conversion::<A, B>();
        self
    }

    /// Register a field selector conversion for one kind
    pub fn add_field_label_conversion_func(
        &mut self,
        gvk: GroupVersionKind,
        f: impl Fn(&str, &str) -> Result<(String, String)> + Send + Sync + 'static,
    ) -> &mut Self {
        self.field_label_conversion_funcs.insert(gvk, Arc::new(f));
        self
    }

    /// Translate a field selector using the kind's registered function, or the
    /// metadata fallback
    pub fn convert_field_label(&self, gvk: &GroupVersionKind, label: &str, value: &str) -> Result<(String, String)> {
        match self.field_label_conversion_funcs.get(gvk) {
            Some(f) => f(label, value),
            None => default_meta_field_selector_conversion(label, value),
        }
    }

    /// Register the defaulting function for layout `T`, replacing any previous one
    pub fn add_type_defaulting_func<T: Object>(
        &mut self,
        f: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> &mut Self {
        let erased: DefaulterFn = Arc::new(move |obj: &mut dyn Object| {
            if let Some(typed) = obj.downcast_mut::<T>() {
                f(typed)
            }
        });
        self.defaulter_funcs.insert(Layout::of::<T>(), erased);
        self
    }

    /// Apply the defaulting function registered for the object's layout, if any
    pub fn default_object(&self, obj: &mut dyn Object) {
        if let Some(f) = self.defaulter_funcs.get(&obj.layout()) {
            f(obj);
        }
    }

    /// Convert `src` into `dst`.
    ///
    /// Unstructured to unstructured is a copy. Typed to unstructured goes
    /// through the unstructured converter; internal objects are first
    /// converted to the versioner passed as `context`. Unstructured to typed
    /// rehydrates the declared kind, then converts.
    pub fn convert(&self, src: &dyn Object, dst: &mut dyn Object, context: Option<&dyn Any>) -> Result<()> {
        match (src.is_unstructured(), dst.is_unstructured()) {
            (true, true) => {
                let map = src.to_tree(&mut ToValue::default())?;
                dst.fill_from_tree(&map, &mut FromValue::default())?;
                Ok(())
            }
            (false, true) => {
                let (kinds, unversioned) = self.object_kinds(src)?;
                let gvk = kinds.into_iter().next().unwrap_or_default();
                if unversioned || !gvk.is_internal() {
                    let map = to_unstructured(src)?;
                    from_unstructured(&map, dst)?;
                    dst.set_group_version_kind(&gvk);
                    return Ok(());
                }
                let target = context.and_then(versioner_from_context).ok_or_else(|| {
                    Error::conversion(format!(
                        "unable to convert the internal object type {} to Unstructured without providing a preferred version to convert to",
                        src.layout()
                    ))
                })?;
                let versioned = self.convert_to_version(src, target)?;
                let map = to_unstructured(versioned.as_ref())?;
                from_unstructured(&map, dst)
            }
            (true, false) => {
                let typed = self.unstructured_to_typed(src)?;
                self.converter.convert(typed.as_any(), dst.as_any_mut(), context)
            }
            (false, false) => self.converter.convert(src.as_any(), dst.as_any_mut(), context),
        }
    }

    fn unstructured_to_typed(&self, obj: &dyn Object) -> Result<Box<dyn Object>> {
        let (kinds, _) = self.object_kinds(obj)?;
        let gvk = kinds.into_iter().next().unwrap_or_default();
        let mut typed = self.new_object(&gvk)?;
        let map = obj.to_tree(&mut ToValue::default())?;
        from_unstructured(&map, typed.as_mut())
            .map_err(|e| Error::conversion(format!("unable to convert unstructured object to {gvk}: {e}")))?;
        Ok(typed)
    }

    /// Convert a copy of `obj` to the version `target` selects.
    ///
    /// The input is never modified. The result carries the chosen kind, or no
    /// kind at all when the target is an internal version.
    pub fn convert_to_version(&self, obj: &dyn Object, target: &dyn GroupVersioner) -> Result<Box<dyn Object>> {
        self.convert_to_version_inner(Input::Borrowed(obj), target)
    }

    /// Like [`Scheme::convert_to_version`], but stamps `obj` in place when no
    /// conversion is needed.
    pub fn unsafe_convert_to_version(
        &self,
        obj: Box<dyn Object>,
        target: &dyn GroupVersioner,
    ) -> Result<Box<dyn Object>> {
        self.convert_to_version_inner(Input::Owned(obj), target)
    }

    fn convert_to_version_inner(&self, input: Input<'_>, target: &dyn GroupVersioner) -> Result<Box<dyn Object>> {
        let input = if input.as_object().is_unstructured() {
            Input::Owned(self.unstructured_to_typed(input.as_object())?)
        } else {
            input
        };
        let layout = input.as_object().layout();
        let kinds = match self.type_to_gvk.get(&layout) {
            Some(kinds) if !kinds.is_empty() => kinds,
            _ => return Err(self.not_registered_type(layout)),
        };

        let unversioned_target = || {
            self.unversioned_types.get(&layout).map(|unversioned| {
                target
                    .kind_for_group_version_kinds(std::slice::from_ref(unversioned))
                    .unwrap_or_else(|| unversioned.clone())
            })
        };

        let Some(gvk) = target.kind_for_group_version_kinds(kinds) else {
            if let Some(gvk) = unversioned_target() {
                return Ok(set_target_kind(input.into_owned(), &gvk));
            }
            return Err(NotRegisteredError::Target {
                type_name: layout.name().to_string(),
                target: target.identifier(),
                scheme: self.scheme_name.clone(),
            }
            .into());
        };

        // already the requested kind
        if kinds.contains(&gvk) {
            return Ok(set_target_kind(input.into_owned(), &gvk));
        }
        if let Some(gvk) = unversioned_target() {
            return Ok(set_target_kind(input.into_owned(), &gvk));
        }

        let mut out = self.new_object(&gvk)?;
        tracing::trace!(from = %layout, to = %gvk, "converting");
        self.converter
            .convert(input.as_object().as_any(), out.as_any_mut(), None)?;
        Ok(set_target_kind(out, &gvk))
    }

    /// Declare the preferred order of versions for one group.
    pub fn set_version_priority(&mut self, versions: &[GroupVersion]) -> Result<()> {
        let mut groups = BTreeSet::new();
        let mut order = Vec::with_capacity(versions.len());
        for gv in versions {
            if gv.version.is_empty() || gv.version == apimachinery_core::INTERNAL_VERSION {
                return Err(Error::Registration(format!(
                    "internal versions cannot be prioritized: {gv}"
                )));
            }
            groups.insert(gv.group.clone());
            order.push(gv.version.clone());
        }
        if groups.len() != 1 {
            return Err(Error::Registration(format!(
                "must register versions for exactly one group: {}",
                groups.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }
        if let Some(group) = groups.into_iter().next() {
            self.version_priority.insert(group, order);
        }
        Ok(())
    }

    /// Declared versions of `group` in priority order, followed by any other
    /// observed versions of that group
    pub fn prioritized_versions_for_group(&self, group: &str) -> Vec<GroupVersion> {
        let mut ret = self
            .version_priority
            .get(group)
            .into_iter()
            .flatten()
            .map(|version| GroupVersion::gv(group, version))
            .collect::<Vec<_>>();
        for observed in self.observed_versions.iter().filter(|gv| gv.group == group) {
            if !ret.contains(observed) {
                ret.push(observed.clone());
            }
        }
        ret
    }

    /// Declared versions of every group, followed by any other observed versions
    pub fn prioritized_versions_all_groups(&self) -> Vec<GroupVersion> {
        let mut ret = self
            .version_priority
            .iter()
            .flat_map(|(group, versions)| versions.iter().map(move |v| GroupVersion::gv(group, v)))
            .collect::<Vec<_>>();
        for observed in &self.observed_versions {
            if !ret.contains(observed) {
                ret.push(observed.clone());
            }
        }
        ret
    }

    /// The most preferred version of every group
    pub fn preferred_version_all_groups(&self) -> Vec<GroupVersion> {
        let mut ret = self
            .version_priority
            .iter()
            .filter_map(|(group, versions)| versions.first().map(|v| GroupVersion::gv(group, v)))
            .collect::<Vec<_>>();
        for observed in &self.observed_versions {
            if !ret.iter().any(|gv| gv.group == observed.group) {
                ret.push(observed.clone());
            }
        }
        ret
    }

    /// Whether any version of `group` has been registered
    pub fn is_group_registered(&self, group: &str) -> bool {
        self.observed_versions.iter().any(|gv| gv.group == group)
    }

    /// Whether `gv` has been registered
    pub fn is_version_registered(&self, gv: &GroupVersion) -> bool {
        self.observed_versions.contains(gv)
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Self::with_name("default")
    }
}

impl ObjectTyper for Scheme {
    fn object_kinds(&self, obj: &dyn Object) -> Result<(Vec<GroupVersionKind>, bool)> {
        Scheme::object_kinds(self, obj)
    }

    fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        Scheme::recognizes(self, gvk)
    }
}

impl ObjectCreater for Scheme {
    fn new_object(&self, gvk: &GroupVersionKind) -> Result<Box<dyn Object>> {
        Scheme::new_object(self, gvk)
    }
}

impl ObjectConvertor for Scheme {
    fn convert(&self, src: &dyn Object, dst: &mut dyn Object, context: Option<&dyn Any>) -> Result<()> {
        Scheme::convert(self, src, dst, context)
    }

    fn convert_to_version(&self, obj: &dyn Object, target: &dyn GroupVersioner) -> Result<Box<dyn Object>> {
        Scheme::convert_to_version(self, obj, target)
    }

    fn unsafe_convert_to_version(
        &self,
        obj: Box<dyn Object>,
        target: &dyn GroupVersioner,
    ) -> Result<Box<dyn Object>> {
        Scheme::unsafe_convert_to_version(self, obj, target)
    }

    fn convert_field_label(&self, gvk: &GroupVersionKind, label: &str, value: &str) -> Result<(String, String)> {
        Scheme::convert_field_label(self, gvk, label, value)
    }
}

impl ObjectDefaulter for Scheme {
    fn default_object(&self, obj: &mut dyn Object) {
        Scheme::default_object(self, obj)
    }
}

static DEFAULT_SCHEME: OnceLock<Arc<Scheme>> = OnceLock::new();

/// Install the process-wide default scheme.
///
/// Only the first call succeeds; later calls hand the rejected scheme back.
pub fn install_default_scheme(scheme: Scheme) -> Result<(), Arc<Scheme>> {
    DEFAULT_SCHEME.set(Arc::new(scheme))
}

/// The process-wide default scheme.
///
/// Unless one was installed, this holds the meta kinds registered for `v1`.
pub fn default_scheme() -> Arc<Scheme> {
    DEFAULT_SCHEME
        .get_or_init(|| {
            let mut scheme = Scheme::with_name("default");
            meta::add_to_group_version(&mut scheme, &GroupVersion::gv("", "v1"));
            Arc::new(scheme)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apimachinery_core::{ObjectMeta, Reflect, Status, TypeMeta, Unstructured, Value};

    #[derive(Reflect, Clone, Debug, Default)]
    #[reflect(object, crates(core = "::apimachinery_core"))]
    struct WidgetV1 {
        #[reflect(inline)]
        types: TypeMeta,
        metadata: ObjectMeta,
        size: i32,
    }

    #[derive(Reflect, Clone, Debug, Default)]
    #[reflect(object, crates(core = "::apimachinery_core"))]
    struct Widget {
        #[reflect(inline)]
        types: TypeMeta,
        metadata: ObjectMeta,
        size: i64,
    }

    fn v1() -> GroupVersion {
        GroupVersion::gv("toys", "v1")
    }

    fn scheme() -> Scheme {
        let mut scheme = Scheme::with_name("test");
        scheme
            .add_known_type_with_name(v1().with_kind("Widget"), KnownType::of::<WidgetV1>())
            .add_known_type_with_name(
                GroupVersion::internal("toys").with_kind("Widget"),
                KnownType::of::<Widget>(),
            )
            .add_conversion_func(|src: &WidgetV1, dst: &mut Widget, _| {
                dst.metadata = src.metadata.clone();
                dst.size = i64::from(src.size);
                Ok(())
            })
            .add_conversion_func(|src: &Widget, dst: &mut WidgetV1, _| {
                dst.metadata = src.metadata.clone();
                dst.size = i32::try_from(src.size).map_err(Error::conversion)?;
                Ok(())
            })
            .add_unversioned_types(&GroupVersion::gv("", "v1"), [KnownType::of::<Status>()]);
        scheme
    }

    fn widget(size: i32) -> WidgetV1 {
        let mut w = WidgetV1 {
            size,
            ..WidgetV1::default()
        };
        w.metadata.name = "w".into();
        w.set_group_version_kind(&v1().with_kind("Widget"));
        w
    }

    #[test]
    fn registration_tracks_kinds_and_versions() {
        let scheme = scheme();
        let (kinds, unversioned) = scheme.object_kinds(&widget(1)).unwrap();
        assert_eq!(kinds, [v1().with_kind("Widget")]);
        assert!(!unversioned);
        assert!(scheme.recognizes(&v1().with_kind("Widget")));
        assert!(scheme.is_version_registered(&v1()));
        assert!(!scheme.is_version_registered(&GroupVersion::internal("toys")));
        assert_eq!(scheme.known_types(&v1()).len(), 1);

        let made = scheme.new_object(&v1().with_kind("Widget")).unwrap();
        assert!(made.is::<WidgetV1>());

        // unversioned kinds resolve in any group version
        let status = scheme.new_object(&GroupVersionKind::gvk("toys", "v9", "Status")).unwrap();
        assert!(status.is::<Status>());
        assert_eq!(scheme.is_unversioned(status.as_ref()), (true, true));

        let err = scheme.new_object(&v1().with_kind("Gizmo")).unwrap_err();
        assert!(err.is_not_registered());
        assert!(scheme.object_kinds(&Unstructured::default()).unwrap_err().is_missing_kind());
    }

    #[test]
    #[should_panic(expected = "double registration")]
    fn conflicting_registrations_panic() {
        let mut scheme = scheme();
        scheme.add_known_type_with_name(v1().with_kind("Widget"), KnownType::of::<Widget>());
    }

    #[test]
    #[should_panic(expected = "version is required")]
    fn empty_versions_panic() {
        Scheme::new().add_known_type::<Widget>(&GroupVersion::gv("toys", ""));
    }

    #[test]
    fn converts_through_the_internal_hub() {
        let scheme = scheme();
        let original = widget(7);
        let internal = scheme.convert_to_version(&original, &InternalGroupVersioner).unwrap();
        assert!(internal.group_version_kind().is_empty());
        assert_eq!(internal.downcast_ref::<Widget>().unwrap().size, 7);
        // the input is untouched
        assert_eq!(original.group_version_kind(), v1().with_kind("Widget"));

        let back = scheme.unsafe_convert_to_version(internal, &v1()).unwrap();
        assert_eq!(back.group_version_kind(), v1().with_kind("Widget"));
        let back = back.downcast::<WidgetV1>().unwrap();
        assert_eq!(back.size, 7);
        assert_eq!(back.metadata, original.metadata);
    }

    #[test]
    fn converting_to_the_current_version_only_stamps() {
        let scheme = scheme();
        let mut unstamped = widget(2);
        unstamped.set_group_version_kind(&GroupVersionKind::default());
        let out = scheme.convert_to_version(&unstamped, &v1()).unwrap();
        assert_eq!(out.group_version_kind(), v1().with_kind("Widget"));

        let refused = scheme.convert_to_version(&unstamped, &GroupVersion::gv("other", "v1"));
        assert!(matches!(refused, Err(Error::NotRegistered(NotRegisteredError::Target { .. }))));

        let status = scheme.convert_to_version(&Status::success(), &GroupVersion::gv("other", "v1")).unwrap();
        assert_eq!(status.group_version_kind(), GroupVersionKind::gvk("", "v1", "Status"));
    }

    #[test]
    fn convert_handles_unstructured_sides() {
        let scheme = scheme();
        let mut u = Unstructured::default();
        scheme.convert(&widget(3), &mut u, None).unwrap();
        assert_eq!(u.nested_field(&["size"]), Some(&Value::Int(3)));
        assert_eq!(u.group_version_kind(), v1().with_kind("Widget"));

        let mut internal = Widget::default();
        scheme.convert(&u, &mut internal, None).unwrap();
        assert_eq!(internal.size, 3);

        let mut u2 = Unstructured::default();
        let err = scheme.convert(&internal, &mut u2, None).unwrap_err();
        assert!(err.is_conversion());
        scheme.convert(&internal, &mut u2, Some(&v1())).unwrap();
        assert_eq!(u2.name(), "w");
    }

    #[test]
    fn defaulting_and_field_labels() {
        let mut scheme = scheme();
        scheme.add_type_defaulting_func(|w: &mut Widget| {
            if w.size == 0 {
                w.size = 10;
            }
        });
        scheme.add_field_label_conversion_func(v1().with_kind("Widget"), |label, value| match label {
            "spec.size" => Ok(("size".into(), value.into())),
            _ => default_meta_field_selector_conversion(label, value),
        });

        let mut w = Widget::default();
        scheme.default_object(&mut w);
        scheme.default_object(&mut w);
        assert_eq!(w.size, 10);

        let gvk = v1().with_kind("Widget");
        assert_eq!(scheme.convert_field_label(&gvk, "spec.size", "3").unwrap(), ("size".into(), "3".into()));
        assert!(scheme.convert_field_label(&gvk, "metadata.name", "a").is_ok());
        assert!(scheme.convert_field_label(&GroupVersion::internal("toys").with_kind("Widget"), "spec.size", "3").is_err());
    }

    #[test]
    fn version_priority_merges_observed_versions() {
        let mut scheme = scheme();
        scheme.add_known_type::<Widget>(&GroupVersion::gv("toys", "v2"));
        scheme
            .set_version_priority(&[GroupVersion::gv("toys", "v2"), GroupVersion::gv("toys", "v1beta1")])
            .unwrap();
        assert_eq!(
            scheme.prioritized_versions_for_group("toys"),
            [
                GroupVersion::gv("toys", "v2"),
                GroupVersion::gv("toys", "v1beta1"),
                GroupVersion::gv("toys", "v1"),
            ]
        );
        assert_eq!(
            scheme.preferred_version_all_groups(),
            [GroupVersion::gv("toys", "v2"), GroupVersion::gv("", "v1")]
        );
        assert!(scheme
            .set_version_priority(&[GroupVersion::gv("a", "v1"), GroupVersion::gv("b", "v1")])
            .is_err());
        assert!(scheme.set_version_priority(&[GroupVersion::internal("a")]).is_err());
    }
}
