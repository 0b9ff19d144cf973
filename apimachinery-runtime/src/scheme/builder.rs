use std::fmt;

use super::Scheme;
use crate::error::Result;

type AddToScheme = Box<dyn Fn(&mut Scheme) -> Result<()> + Send + Sync>;

/// An ordered list of registration functions, applied together to a scheme.
///
/// API packages expose a builder so that callers can install all of their
/// kinds, conversions and defaulters with one call.
#[derive(Default)]
pub struct SchemeBuilder {
    funcs: Vec<AddToScheme>,
}

impl fmt::Debug for SchemeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeBuilder").field("funcs", &self.funcs.len()).finish()
    }
}

impl SchemeBuilder {
    /// An empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration function
    #[must_use]
    pub fn with(mut self, f: impl Fn(&mut Scheme) -> Result<()> + Send + Sync + 'static) -> Self {
        self.register(f);
        self
    }

    /// Append a registration function in place
    pub fn register(&mut self, f: impl Fn(&mut Scheme) -> Result<()> + Send + Sync + 'static) -> &mut Self {
        self.funcs.push(Box::new(f));
        self
    }

    /// Apply every function in order, stopping at the first failure
    pub fn add_to_scheme(&self, scheme: &mut Scheme) -> Result<()> {
        self.funcs.iter().try_for_each(|f| f(scheme))
    }

    /// Build a fresh named scheme from this builder
    pub fn build(&self, name: impl Into<String>) -> Result<Scheme> {
        let mut scheme = Scheme::with_name(name);
        self.add_to_scheme(&mut scheme)?;
        Ok(scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, scheme::meta};
    use apimachinery_core::{GroupVersion, GroupVersionKind, Status};

    #[test]
    fn functions_apply_in_order_and_stop_on_failure() {
        let builder = SchemeBuilder::new()
            .with(|s| {
                meta::add_to_group_version(s, &GroupVersion::gv("apps", "v1"));
                Ok(())
            })
            .with(|s| {
                s.set_version_priority(&[GroupVersion::gv("apps", "v1")])
            });
        let scheme = builder.build("apps").unwrap();
        assert!(scheme.recognizes(&GroupVersionKind::gvk("apps", "v1", "WatchEvent")));
        assert!(scheme.new_object(&GroupVersionKind::gvk("apps", "v1", "Status")).unwrap().is::<Status>());
        assert_eq!(scheme.prioritized_versions_for_group("apps")[0], GroupVersion::gv("apps", "v1"));

        let failing = SchemeBuilder::new()
            .with(|_| Err(Error::Registration("nope".into())))
            .with(|_| panic!("must not run"));
        assert!(failing.build("broken").is_err());
    }
}
