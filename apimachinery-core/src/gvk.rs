//! Type information structs: groups, versions, kinds and resources.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The reserved version token marking the internal (hub) form of a kind.
///
/// Objects carrying this version never appear on the wire.
pub const INTERNAL_VERSION: &str = "__internal";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unexpected GroupVersion string: {0}")]
/// Failed to parse group version.
pub struct ParseGroupVersionError(pub String);

/// A group and kind pair, without a version.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKind {
    /// API group
    pub group: String,
    /// Kind
    pub kind: String,
}

impl GroupKind {
    /// Construct from explicit group and kind
    pub fn gk(group: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Attach a version
    pub fn with_version(&self, version: &str) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, version, &self.kind)
    }

    /// Whether both group and kind are empty
    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.kind.is_empty()
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// A group and resource pair, without a version.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupResource {
    /// API group
    pub group: String,
    /// Plural resource name
    pub resource: String,
}

impl GroupResource {
    /// Construct from explicit group and resource
    pub fn gr(group: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            resource: resource.to_string(),
        }
    }

    /// Attach a version
    pub fn with_version(&self, version: &str) -> GroupVersionResource {
        GroupVersionResource::gvr(&self.group, version, &self.resource)
    }

    /// Whether both group and resource are empty
    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.resource.is_empty()
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// Core information about an API kind.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionKind {
    /// API group
    pub group: String,
    /// Version
    pub version: String,
    /// Kind
    pub kind: String,
}

impl GroupVersionKind {
    /// Construct from explicit group, version, and kind
    pub fn gvk(group_: &str, version_: &str, kind_: &str) -> Self {
        let version = version_.to_string();
        let group = group_.to_string();
        let kind = kind_.to_string();

        Self { group, version, kind }
    }

    /// Build from the wire `apiVersion` and `kind` pair.
    ///
    /// An unparseable `apiVersion` yields an identifier carrying only the kind.
    pub fn from_api_version_and_kind(api_version: &str, kind: &str) -> Self {
        match api_version.parse::<GroupVersion>() {
            Ok(gv) => gv.with_kind(kind),
            Err(_) => Self {
                kind: kind.to_string(),
                ..Self::default()
            },
        }
    }

    /// Split into the wire `apiVersion` and `kind` pair
    pub fn to_api_version_and_kind(&self) -> (String, String) {
        (self.api_version(), self.kind.clone())
    }

    /// Generate the apiVersion string used in a kind's yaml
    pub fn api_version(&self) -> String {
        self.group_version().api_version()
    }

    /// The group and version of this kind
    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::gv(&self.group, &self.version)
    }

    /// The group and kind of this kind
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::gk(&self.group, &self.kind)
    }

    /// Whether every component is empty
    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.version.is_empty() && self.kind.is_empty()
    }

    /// Whether this is the internal version of its kind
    pub fn is_internal(&self) -> bool {
        self.version == INTERNAL_VERSION
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
    }
}

/// Core information about a family of API Resources
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersion {
    /// API group
    pub group: String,
    /// Version
    pub version: String,
}

impl GroupVersion {
    /// Construct from explicit group and version
    pub fn gv(group_: &str, version_: &str) -> Self {
        let version = version_.to_string();
        let group = group_.to_string();
        Self { group, version }
    }

    /// The internal version of a group
    pub fn internal(group: &str) -> Self {
        Self::gv(group, INTERNAL_VERSION)
    }

    /// Upgrade a GroupVersion to a GroupVersionKind
    pub fn with_kind(&self, kind: &str) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, kind)
    }

    /// Upgrade a GroupVersion to a GroupVersionResource
    pub fn with_resource(&self, resource: &str) -> GroupVersionResource {
        GroupVersionResource::gvr(&self.group, &self.version, resource)
    }

    /// Generate the apiVersion string used in a kind's yaml
    ///
    /// The legacy group (empty name) formats as the bare version.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Whether both group and version are empty
    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.version.is_empty()
    }
}

impl FromStr for GroupVersion {
    type Err = ParseGroupVersionError;

    fn from_str(gv: &str) -> Result<Self, Self::Err> {
        if gv.is_empty() || gv == "/" {
            return Ok(Self::default());
        }
        match gv.matches('/').count() {
            0 => Ok(Self::gv("", gv)),
            1 => {
                let (group, version) = gv.split_once('/').ok_or_else(|| ParseGroupVersionError(gv.into()))?;
                Ok(Self::gv(group, version))
            }
            _ => Err(ParseGroupVersionError(gv.into())),
        }
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.api_version())
    }
}

/// Represents a type-erased object resource.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionResource {
    /// API group
    pub group: String,
    /// Version
    pub version: String,
    /// Resource
    pub resource: String,
}

impl GroupVersionResource {
    /// Set the api group, version, and the plural resource name.
    pub fn gvr(group_: &str, version_: &str, resource_: &str) -> Self {
        let version = version_.to_string();
        let group = group_.to_string();
        let resource = resource_.to_string();
        Self {
            group,
            version,
            resource,
        }
    }

    /// The group and version of this resource
    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::gv(&self.group, &self.version)
    }

    /// The group and resource of this resource
    pub fn group_resource(&self) -> GroupResource {
        GroupResource::gr(&self.group, &self.resource)
    }

    /// Whether every component is empty
    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.version.is_empty() && self.resource.is_empty()
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}, Resource={}", self.group, self.version, self.resource)
    }
}

/// Parse a `resource.version.group` command line argument.
///
/// A fully specified argument (at least two dots) also yields a candidate
/// [`GroupVersionResource`]; the [`GroupResource`] reading is always returned.
pub fn parse_resource_arg(arg: &str) -> (Option<GroupVersionResource>, GroupResource) {
    let gvr = if arg.matches('.').count() >= 2 {
        let mut parts = arg.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(resource), Some(version), Some(group)) => {
                Some(GroupVersionResource::gvr(group, version, resource))
            }
            _ => None,
        }
    } else {
        None
    };
    (gvr, parse_group_resource(arg))
}

/// Parse a `kind.version.group` command line argument.
pub fn parse_kind_arg(arg: &str) -> (Option<GroupVersionKind>, GroupKind) {
    let gvk = if arg.matches('.').count() >= 2 {
        let mut parts = arg.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(version), Some(group)) => Some(GroupVersionKind::gvk(group, version, kind)),
            _ => None,
        }
    } else {
        None
    };
    (gvk, parse_group_kind(arg))
}

/// Parse `resource.group`; everything after the first dot is the group.
pub fn parse_group_resource(gr: &str) -> GroupResource {
    match gr.split_once('.') {
        Some((resource, group)) => GroupResource::gr(group, resource),
        None => GroupResource::gr("", gr),
    }
}

/// Parse `kind.group`; everything after the first dot is the group.
pub fn parse_group_kind(gk: &str) -> GroupKind {
    match gk.split_once('.') {
        Some((kind, group)) => GroupKind::gk(group, kind),
        None => GroupKind::gk("", gk),
    }
}

/// Selects, from a set of candidate kinds, the one an object should be encoded as.
pub trait GroupVersioner: fmt::Debug + Send + Sync {
    /// Pick the target kind, or `None` if this versioner refuses all candidates.
    fn kind_for_group_version_kinds(&self, kinds: &[GroupVersionKind]) -> Option<GroupVersionKind>;

    /// A stable identifier, used to key encoders built for this versioner.
    fn identifier(&self) -> String;

    /// Whether conversion should be skipped entirely.
    fn is_disabled(&self) -> bool {
        false
    }
}

impl GroupVersioner for GroupVersion {
    /// Prefers an exact group/version match, then any candidate in the same group
    /// with this version substituted.
    fn kind_for_group_version_kinds(&self, kinds: &[GroupVersionKind]) -> Option<GroupVersionKind> {
        if let Some(exact) = kinds
            .iter()
            .find(|gvk| gvk.group == self.group && gvk.version == self.version)
        {
            return Some(exact.clone());
        }
        kinds
            .iter()
            .find(|gvk| gvk.group == self.group)
            .map(|gvk| self.with_kind(&gvk.kind))
    }

    fn identifier(&self) -> String {
        self.api_version()
    }
}

/// An ordered list of [`GroupVersion`]s acting as a single versioner.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupVersions(pub Vec<GroupVersion>);

impl GroupVersioner for GroupVersions {
    fn kind_for_group_version_kinds(&self, kinds: &[GroupVersionKind]) -> Option<GroupVersionKind> {
        let targets = self
            .0
            .iter()
            .filter_map(|gv| gv.kind_for_group_version_kinds(kinds))
            .collect::<Vec<_>>();
        match targets.len() {
            0 => None,
            1 => targets.into_iter().next(),
            // ties prefer a target that was literally one of the candidates
            _ => targets
                .iter()
                .find(|target| kinds.contains(target))
                .or_else(|| targets.first())
                .cloned(),
        }
    }

    fn identifier(&self) -> String {
        self.0.iter().map(GroupVersion::api_version).collect::<Vec<_>>().join(",")
    }
}

impl From<Vec<GroupVersion>> for GroupVersions {
    fn from(gvs: Vec<GroupVersion>) -> Self {
        Self(gvs)
    }
}

/// Selects the internal version of a kind.
///
/// An explicit internal registration among the candidates wins; otherwise the
/// first candidate's kind is moved to the internal version.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InternalGroupVersioner;

impl GroupVersioner for InternalGroupVersioner {
    fn kind_for_group_version_kinds(&self, kinds: &[GroupVersionKind]) -> Option<GroupVersionKind> {
        kinds.iter().find(|gvk| gvk.is_internal()).cloned().or_else(|| {
            kinds
                .first()
                .map(|gvk| GroupVersionKind::gvk(&gvk.group, INTERNAL_VERSION, &gvk.kind))
        })
    }

    fn identifier(&self) -> String {
        "internal".into()
    }
}

/// A versioner that refuses every kind and tells codecs to skip conversion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DisabledGroupVersioner;

impl GroupVersioner for DisabledGroupVersioner {
    fn kind_for_group_version_kinds(&self, _kinds: &[GroupVersionKind]) -> Option<GroupVersionKind> {
        None
    }

    fn identifier(&self) -> String {
        "disabled".into()
    }

    fn is_disabled(&self) -> bool {
        true
    }
}

/// Moves kinds from a set of accepted groups into a single target group version.
///
/// An accepted [`GroupKind`] with an empty kind accepts the whole group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiGroupVersioner {
    target: GroupVersion,
    accepted: Vec<GroupKind>,
    coerce: bool,
}

impl MultiGroupVersioner {
    /// Accept the given group kinds plus the target's own group.
    pub fn new(target: GroupVersion, accepted: impl IntoIterator<Item = GroupKind>) -> Self {
        let mut accepted = accepted.into_iter().collect::<Vec<_>>();
        accepted.push(GroupKind::gk(&target.group, ""));
        Self {
            target,
            accepted,
            coerce: false,
        }
    }

    /// Like [`MultiGroupVersioner::new`], but falls back to the first candidate's
    /// kind when nothing matches.
    pub fn coercing(target: GroupVersion, accepted: impl IntoIterator<Item = GroupKind>) -> Self {
        Self {
            coerce: true,
            ..Self::new(target, accepted)
        }
    }
}

impl GroupVersioner for MultiGroupVersioner {
    fn kind_for_group_version_kinds(&self, kinds: &[GroupVersionKind]) -> Option<GroupVersionKind> {
        for src in kinds {
            for accepted in &self.accepted {
                if accepted.group != src.group {
                    continue;
                }
                if !accepted.kind.is_empty() && accepted.kind != src.kind {
                    continue;
                }
                return Some(self.target.with_kind(&src.kind));
            }
        }
        if self.coerce {
            return kinds.first().map(|gvk| self.target.with_kind(&gvk.kind));
        }
        None
    }

    fn identifier(&self) -> String {
        let groups = self.accepted.iter().map(ToString::to_string).collect::<Vec<_>>();
        format!("{}:{}", self.target.api_version(), groups.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_group_versions() {
        let cases = [
            ("", GroupVersion::default()),
            ("/", GroupVersion::default()),
            ("v1", GroupVersion::gv("", "v1")),
            ("apps/v1", GroupVersion::gv("apps", "v1")),
            ("/v1", GroupVersion::gv("", "v1")),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<GroupVersion>().unwrap(), expected, "parsing {input:?}");
        }
        assert!("a/b/c".parse::<GroupVersion>().is_err());
    }

    #[test]
    fn legacy_group_formats_as_bare_version() {
        let gv = GroupVersion::gv("", "v1");
        assert_eq!(gv.api_version(), "v1");
        assert_eq!(gv.api_version().parse::<GroupVersion>().unwrap(), gv);
        assert_eq!(GroupVersion::gv("apps", "v1").to_string(), "apps/v1");
        assert_eq!(
            GroupVersionKind::gvk("apps", "v1", "Deployment").to_string(),
            "apps/v1, Kind=Deployment"
        );
        assert_eq!(GroupKind::gk("apps", "Deployment").to_string(), "Deployment.apps");
    }

    #[test]
    fn api_version_and_kind() {
        let gvk = GroupVersionKind::from_api_version_and_kind("batch/v1", "Job");
        assert_eq!(gvk, GroupVersionKind::gvk("batch", "v1", "Job"));
        let broken = GroupVersionKind::from_api_version_and_kind("a/b/c", "Job");
        assert_eq!(broken, GroupVersionKind::gvk("", "", "Job"));
    }

    #[test]
    fn parses_resource_args() {
        let (gvr, gr) = parse_resource_arg("deployments.v1.apps");
        assert_eq!(gvr, Some(GroupVersionResource::gvr("apps", "v1", "deployments")));
        assert_eq!(gr, GroupResource::gr("v1.apps", "deployments"));
        let (gvr, gr) = parse_resource_arg("pods");
        assert!(gvr.is_none());
        assert_eq!(gr, GroupResource::gr("", "pods"));
        let (gvk, gk) = parse_kind_arg("Deployment.apps");
        assert!(gvk.is_none());
        assert_eq!(gk, GroupKind::gk("apps", "Deployment"));
    }

    #[test]
    fn group_version_versioner() {
        let kinds = [
            GroupVersionKind::gvk("apps", "v1beta1", "Deployment"),
            GroupVersionKind::gvk("extensions", "v1beta1", "Deployment"),
        ];
        let target = GroupVersion::gv("apps", "v1");
        assert_eq!(
            target.kind_for_group_version_kinds(&kinds),
            Some(GroupVersionKind::gvk("apps", "v1", "Deployment"))
        );
        assert_eq!(GroupVersion::gv("batch", "v1").kind_for_group_version_kinds(&kinds), None);
    }

    #[test]
    fn group_versions_prefer_literal_candidates() {
        let kinds = [GroupVersionKind::gvk("other", "v2", "Thing")];
        let versioner = GroupVersions(vec![GroupVersion::gv("other", "v1"), GroupVersion::gv("other", "v2")]);
        assert_eq!(versioner.kind_for_group_version_kinds(&kinds), Some(kinds[0].clone()));

        let versioner = GroupVersions(vec![GroupVersion::gv("other", "v3"), GroupVersion::gv("other", "v4")]);
        assert_eq!(
            versioner.kind_for_group_version_kinds(&kinds),
            Some(GroupVersionKind::gvk("other", "v3", "Thing"))
        );
    }

    #[test]
    fn internal_versioner() {
        let kinds = [
            GroupVersionKind::gvk("g", "v1", "K"),
            GroupVersionKind::gvk("g", INTERNAL_VERSION, "K"),
        ];
        assert_eq!(
            InternalGroupVersioner.kind_for_group_version_kinds(&kinds),
            Some(kinds[1].clone())
        );
        assert_eq!(
            InternalGroupVersioner.kind_for_group_version_kinds(&kinds[..1]),
            Some(GroupVersionKind::gvk("g", INTERNAL_VERSION, "K"))
        );
        assert_eq!(InternalGroupVersioner.kind_for_group_version_kinds(&[]), None);
        assert!(DisabledGroupVersioner.is_disabled());
    }

    #[test]
    fn multi_group_versioner() {
        let target = GroupVersion::gv("apps", "v1");
        let versioner = MultiGroupVersioner::new(target.clone(), [GroupKind::gk("extensions", "Deployment")]);
        assert_eq!(
            versioner.kind_for_group_version_kinds(&[GroupVersionKind::gvk("extensions", "v1beta1", "Deployment")]),
            Some(target.with_kind("Deployment"))
        );
        assert_eq!(
            versioner.kind_for_group_version_kinds(&[GroupVersionKind::gvk("extensions", "v1beta1", "Ingress")]),
            None
        );
        let coercing = MultiGroupVersioner::coercing(target.clone(), []);
        assert_eq!(
            coercing.kind_for_group_version_kinds(&[GroupVersionKind::gvk("batch", "v1", "Job")]),
            Some(target.with_kind("Job"))
        );
    }
}
