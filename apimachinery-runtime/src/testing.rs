//! Fixture kinds shared by the unit tests.
use apimachinery_core::{GroupVersion, Object, ObjectMeta, Reflect, TypeMeta};

use crate::{
    error::Error,
    scheme::{meta, KnownType, Scheme},
};

/// `toys/v1, Kind=Gadget`
#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(object, crates(core = "::apimachinery_core"))]
pub struct Gadget {
    #[reflect(inline)]
    pub types: TypeMeta,
    #[reflect(omitempty)]
    pub metadata: ObjectMeta,
    #[reflect(omitempty)]
    pub size: u64,
    #[reflect(omitempty)]
    pub ratio: f32,
}

/// `toys/__internal, Kind=Gadget`
#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(object, crates(core = "::apimachinery_core"))]
pub struct InternalGadget {
    #[reflect(inline)]
    pub types: TypeMeta,
    #[reflect(omitempty)]
    pub metadata: ObjectMeta,
    #[reflect(omitempty)]
    pub size: i64,
    #[reflect(omitempty)]
    pub ratio: f64,
}

pub fn v1() -> GroupVersion {
    GroupVersion::gv("toys", "v1")
}

pub fn gadget(name: &str, size: u64) -> Gadget {
    let mut gadget = Gadget {
        size,
        ..Gadget::default()
    };
    gadget.metadata.name = name.into();
    gadget.set_group_version_kind(&v1().with_kind("Gadget"));
    gadget
}

/// Both gadget versions with conversions between them, a defaulter on the
/// internal form, and the meta kinds for `toys/v1`.
pub fn scheme() -> Scheme {
    let mut scheme = Scheme::with_name("toys");
    scheme
        .add_known_type_with_name(v1().with_kind("Gadget"), KnownType::of::<Gadget>())
        .add_known_type_with_name(
            GroupVersion::internal("toys").with_kind("Gadget"),
            KnownType::of::<InternalGadget>(),
        )
        .add_conversion_func(|src: &Gadget, dst: &mut InternalGadget, _| {
            dst.metadata = src.metadata.clone();
            dst.size = i64::try_from(src.size).map_err(Error::conversion)?;
            dst.ratio = f64::from(src.ratio);
            Ok(())
        })
        .add_conversion_func(|src: &InternalGadget, dst: &mut Gadget, _| {
            dst.metadata = src.metadata.clone();
            dst.size = u64::try_from(src.size).map_err(Error::conversion)?;
            dst.ratio = src.ratio as f32;
            Ok(())
        })
        .add_type_defaulting_func(|gadget: &mut InternalGadget| {
            if gadget.size == 0 {
                gadget.size = 1;
            }
        });
    meta::add_to_group_version(&mut scheme, &v1());
    scheme
}
