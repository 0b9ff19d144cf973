//! Registration of the meta kinds every API group serves.
use apimachinery_core::{GroupVersion, List, Status, WatchEvent};

use super::{KnownType, Scheme};

/// The group version unversioned meta kinds are registered in
pub fn unversioned() -> GroupVersion {
    GroupVersion::gv("", "v1")
}

/// Register the meta kinds for `gv`.
///
/// `WatchEvent` is registered in `gv` and in the internal version of its
/// group; `Status` and `List` are registered once as unversioned kinds.
pub fn add_to_group_version(scheme: &mut Scheme, gv: &GroupVersion) {
    scheme
        .add_known_type_with_name(gv.with_kind("WatchEvent"), KnownType::of::<WatchEvent>())
        .add_known_type_with_name(
            GroupVersion::internal(&gv.group).with_kind("WatchEvent"),
            KnownType::of::<WatchEvent>(),
        )
        .add_unversioned_types(&unversioned(), [KnownType::of::<Status>(), KnownType::of::<List>()]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use apimachinery_core::{GroupVersionKind, Object};

    #[test]
    fn watch_events_follow_the_group() {
        let mut scheme = Scheme::with_name("meta");
        add_to_group_version(&mut scheme, &GroupVersion::gv("batch", "v1"));
        add_to_group_version(&mut scheme, &GroupVersion::gv("apps", "v1"));

        let (kinds, unversioned) = scheme.object_kinds(&WatchEvent::default()).unwrap();
        assert!(!unversioned);
        assert!(kinds.contains(&GroupVersionKind::gvk("apps", "v1", "WatchEvent")));
        assert!(kinds.contains(&GroupVersionKind::gvk("batch", "__internal", "WatchEvent")));

        let (kinds, unversioned) = scheme.object_kinds(&Status::default()).unwrap();
        assert_eq!(kinds, [GroupVersionKind::gvk("", "v1", "Status")]);
        assert!(unversioned);
        assert!(scheme.new_object(&GroupVersionKind::gvk("batch", "v1", "List")).unwrap().is::<List>());
        assert!(Status::default().group_version_kind().is_empty());
    }
}
