//! Mapping between kinds and the resources that serve them.
use std::collections::{BTreeMap, HashMap};

use apimachinery_core::{GroupKind, GroupVersion, GroupVersionKind, GroupVersionResource, INTERNAL_VERSION};

use crate::error::{MapperError, Result};

/// Whether a resource lives inside namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestScope {
    /// Namespaced resources
    Namespace,
    /// Cluster scoped resources
    Root,
}

impl RestScope {
    /// `namespace` or `root`
    pub fn name(&self) -> &'static str {
        match self {
            RestScope::Namespace => "namespace",
            RestScope::Root => "root",
        }
    }
}

/// Everything needed to address a kind over REST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestMapping {
    /// The plural resource
    pub resource: GroupVersionResource,
    /// The kind served by the resource
    pub group_version_kind: GroupVersionKind,
    /// Where the resource lives
    pub scope: RestScope,
}

/// Guess the plural form of a lowercase kind.
fn to_plural(word: &str) -> String {
    if word == "endpoints" || word == "endpointslices" {
        return word.to_owned();
    }
    // s, x, z, ch and sh take -es (eg. boxes)
    if word.ends_with('s') || word.ends_with('x') || word.ends_with('z') || word.ends_with("ch") || word.ends_with("sh") {
        return format!("{word}es");
    }
    // a consonant followed by y takes -ies (eg. policies)
    if let Some(stem) = word.strip_suffix('y') {
        if stem.chars().last().is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

/// The plural and singular resources a kind is most likely served under
pub fn guess_kind_to_resource(gvk: &GroupVersionKind) -> (GroupVersionResource, GroupVersionResource) {
    if gvk.kind.is_empty() {
        return Default::default();
    }
    let singular = gvk.kind.to_lowercase();
    let gv = gvk.group_version();
    (gv.with_resource(&to_plural(&singular)), gv.with_resource(&singular))
}

fn coerce(resource: &GroupVersionResource) -> GroupVersionResource {
    let mut resource = resource.clone();
    resource.resource = resource.resource.to_lowercase();
    if resource.version == INTERNAL_VERSION {
        resource.version.clear();
    }
    resource
}

/// Maps kinds to resources for a fixed set of group versions.
///
/// Partial resources match any group or version they leave empty. Results
/// are ordered by the position of their group version in the mapper's
/// preferred list; unlisted group versions sort last.
#[derive(Debug, Clone, Default)]
pub struct DefaultRestMapper {
    default_group_versions: Vec<GroupVersion>,
    resource_to_kind: BTreeMap<GroupVersionResource, GroupVersionKind>,
    kind_to_plural_resource: HashMap<GroupVersionKind, GroupVersionResource>,
    kind_to_scope: HashMap<GroupVersionKind, RestScope>,
    singular_to_plural: HashMap<GroupVersionResource, GroupVersionResource>,
    plural_to_singular: BTreeMap<GroupVersionResource, GroupVersionResource>,
}

impl DefaultRestMapper {
    /// An empty mapper preferring `default_group_versions` in order
    pub fn new(default_group_versions: Vec<GroupVersion>) -> Self {
        Self {
            default_group_versions,
            ..Self::default()
        }
    }

    /// Register a kind under its guessed resource names
    pub fn add(&mut self, gvk: GroupVersionKind, scope: RestScope) -> &mut Self {
        let (plural, singular) = guess_kind_to_resource(&gvk);
        self.add_specific(gvk, plural, singular, scope)
    }

    /// Register a kind under explicit resource names
    pub fn add_specific(
        &mut self,
        gvk: GroupVersionKind,
        plural: GroupVersionResource,
        singular: GroupVersionResource,
        scope: RestScope,
    ) -> &mut Self {
        self.singular_to_plural.insert(singular.clone(), plural.clone());
        self.plural_to_singular.insert(plural.clone(), singular.clone());
        self.resource_to_kind.insert(singular, gvk.clone());
        self.resource_to_kind.insert(plural.clone(), gvk.clone());
        self.kind_to_plural_resource.insert(gvk.clone(), plural);
        self.kind_to_scope.insert(gvk, scope);
        self
    }

    fn preference(&self, gv: GroupVersion) -> usize {
        self.default_group_versions
            .iter()
            .position(|preferred| *preferred == gv)
            .unwrap_or(usize::MAX)
    }

    /// Every plural resource matching a partial resource
    pub fn resources_for(&self, input: &GroupVersionResource) -> Result<Vec<GroupVersionResource>> {
        let resource = coerce(input);
        if resource.resource.is_empty() {
            return Err(MapperError::MissingResource(resource).into());
        }
        let has_group = !resource.group.is_empty();
        let has_version = !resource.version.is_empty();
        let matches = |candidate: &GroupVersionResource| {
            candidate.resource == resource.resource
                && (!has_group || candidate.group == resource.group)
                && (!has_version || candidate.version == resource.version)
        };

        let mut found = Vec::new();
        for (plural, singular) in &self.plural_to_singular {
            if (matches(singular) || matches(plural)) && !found.contains(plural) {
                found.push(plural.clone());
            }
        }
        if found.is_empty() {
            return Err(MapperError::NoResourceMatch(resource).into());
        }
        found.sort_by_key(|r| self.preference(r.group_version()));
        Ok(found)
    }

    /// The single plural resource matching a partial resource
    pub fn resource_for(&self, input: &GroupVersionResource) -> Result<GroupVersionResource> {
        let mut found = self.resources_for(input)?;
        if found.len() == 1 {
            return Ok(found.remove(0));
        }
        Err(MapperError::AmbiguousResource {
            partial: input.clone(),
            matching: found,
        }
        .into())
    }

    /// Every kind served by resources matching a partial resource
    pub fn kinds_for(&self, input: &GroupVersionResource) -> Result<Vec<GroupVersionKind>> {
        let resource = coerce(input);
        let has_group = !resource.group.is_empty();
        let has_version = !resource.version.is_empty();
        if has_group && has_version {
            return match self.resource_to_kind.get(&resource) {
                Some(kind) => Ok(vec![kind.clone()]),
                None => Err(MapperError::NoResourceMatch(input.clone()).into()),
            };
        }

        let mut found = Vec::new();
        for (candidate, kind) in &self.resource_to_kind {
            if candidate.resource != resource.resource
                || (has_group && candidate.group != resource.group)
                || (has_version && candidate.version != resource.version)
            {
                continue;
            }
            if !found.contains(kind) {
                found.push(kind.clone());
            }
        }
        if found.is_empty() {
            return Err(MapperError::NoResourceMatch(input.clone()).into());
        }
        found.sort_by_key(|k| self.preference(k.group_version()));
        Ok(found)
    }

    /// The single kind served by resources matching a partial resource
    pub fn kind_for(&self, input: &GroupVersionResource) -> Result<GroupVersionKind> {
        let mut found = self.kinds_for(input)?;
        if found.len() == 1 {
            return Ok(found.remove(0));
        }
        Err(MapperError::AmbiguousKind {
            partial: input.clone(),
            matching: found,
        }
        .into())
    }

    /// Every mapping for a group kind.
    ///
    /// The first registered of `versions` wins; without usable versions every
    /// preferred version of the group is tried.
    pub fn rest_mappings(&self, gk: &GroupKind, versions: &[&str]) -> Result<Vec<RestMapping>> {
        let mut candidates = Vec::new();
        let mut had_version = false;
        for version in versions.iter().filter(|v| !v.is_empty() && **v != INTERNAL_VERSION) {
            had_version = true;
            let gvk = gk.with_version(version);
            if self.kind_to_plural_resource.contains_key(&gvk) {
                candidates.push(gvk);
                break;
            }
        }
        if !had_version {
            candidates.extend(
                self.default_group_versions
                    .iter()
                    .filter(|gv| gv.group == gk.group)
                    .map(|gv| gk.with_version(&gv.version)),
            );
        }
        if candidates.is_empty() {
            return Err(MapperError::NoKindMatch {
                group_kind: gk.clone(),
                searched_versions: versions.iter().map(ToString::to_string).collect(),
            }
            .into());
        }

        let mut mappings = Vec::new();
        for gvk in candidates {
            let Some(resource) = self.kind_to_plural_resource.get(&gvk) else {
                continue;
            };
            let Some(scope) = self.kind_to_scope.get(&gvk) else {
                return Err(MapperError::NoScope {
                    version: gvk.group_version().api_version(),
                    kind: gvk.kind,
                }
                .into());
            };
            mappings.push(RestMapping {
                resource: resource.clone(),
                group_version_kind: gvk.clone(),
                scope: *scope,
            });
        }
        if mappings.is_empty() {
            return Err(MapperError::NoResourceMatch(GroupVersionResource::gvr(&gk.group, "", &gk.kind)).into());
        }
        Ok(mappings)
    }

    /// The preferred mapping for a group kind
    pub fn rest_mapping(&self, gk: &GroupKind, versions: &[&str]) -> Result<RestMapping> {
        let mut mappings = self.rest_mappings(gk, versions)?;
        Ok(mappings.remove(0))
    }

    /// The singular name of a plural resource
    pub fn resource_singularizer(&self, resource: &str) -> Result<String> {
        let partial = GroupVersionResource::gvr("", "", resource);
        let plurals = self.resources_for(&partial)?;
        plurals
            .iter()
            .find_map(|plural| self.plural_to_singular.get(plural))
            .map(|singular| singular.resource.clone())
            .ok_or_else(|| MapperError::NoResourceMatch(partial).into())
    }

    /// The plural resource registered for a singular one, if any
    pub fn plural_for(&self, singular: &GroupVersionResource) -> Option<&GroupVersionResource> {
        self.singular_to_plural.get(singular)
    }
}
