//! Registry of typed conversion functions between record layouts.
use std::{
    any::{type_name, Any, TypeId},
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use bytes::Bytes;

use crate::error::{Error, Result};

type ConversionFn = Arc<dyn Fn(&dyn Any, &mut dyn Any, &Scope<'_>) -> Result<()> + Send + Sync>;

type Pair = (TypeId, TypeId);

/// Converts values between layouts using registered functions.
///
/// Lookup order for a `(source, destination)` pair is: ignored pairs (no-op),
/// explicit conversion functions, generated conversion functions, and finally
/// an error naming both types.
#[derive(Clone)]
pub struct Converter {
    conversion_funcs: HashMap<Pair, ConversionFn>,
    generated_conversion_funcs: HashMap<Pair, ConversionFn>,
    ignored: HashSet<Pair>,
    names: HashMap<TypeId, &'static str>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("conversion_funcs", &self.conversion_funcs.len())
            .field("generated_conversion_funcs", &self.generated_conversion_funcs.len())
            .field("ignored", &self.ignored.len())
            .finish()
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

fn erase<A: Any, B: Any>(
    f: impl Fn(&A, &mut B, &Scope<'_>) -> Result<()> + Send + Sync + 'static,
) -> ConversionFn {
    Arc::new(move |src: &dyn Any, dst: &mut dyn Any, scope: &Scope<'_>| {
        let src = src
            .downcast_ref::<A>()
            .ok_or_else(|| Error::conversion(format!("source is not a {}", type_name::<A>())))?;
        let dst = dst
            .downcast_mut::<B>()
            .ok_or_else(|| Error::conversion(format!("destination is not a {}", type_name::<B>())))?;
        f(src, dst, scope)
    })
}

impl Converter {
    /// A converter that only knows how to copy byte strings
    pub fn new() -> Self {
        let mut converter = Self {
            conversion_funcs: HashMap::new(),
            generated_conversion_funcs: HashMap::new(),
            ignored: HashSet::new(),
            names: HashMap::new(),
        };
        converter.add_conversion_func(|src: &Bytes, dst: &mut Bytes, _| {
            *dst = src.clone();
            Ok(())
        });
        converter.add_conversion_func(|src: &Vec<u8>, dst: &mut Vec<u8>, _| {
            dst.clone_from(src);
            Ok(())
        });
        converter
    }

    fn remember<A: Any, B: Any>(&mut self) -> Pair {
        self.names.insert(TypeId::of::<A>(), type_name::<A>());
        self.names.insert(TypeId::of::<B>(), type_name::<B>());
        (TypeId::of::<A>(), TypeId::of::<B>())
    }

    /// Register an explicit conversion from `A` to `B`, replacing any previous one.
    pub fn add_conversion_func<A: Any, B: Any>(
        &mut self,
        f: impl Fn(&A, &mut B, &Scope<'_>) -> Result<()> + Send + Sync + 'static,
    ) {
        let pair = self.remember::<A, B>();
        self.conversion_funcs.insert(pair, erase(f));
    }

    /// Register a generated conversion from `A` to `B`.
    ///
    /// Generated functions are only consulted when no explicit function exists.
    pub fn add_generated_conversion_func<A: Any, B: Any>(
        &mut self,
        f: impl Fn(&A, &mut B, &Scope<'_>) -> Result<()> + Send + Sync + 'static,
    ) {
        let pair = self.remember::<A, B>();
        self.generated_conversion_funcs.insert(pair, erase(f));
    }

    /// Treat conversions from `A` to `B` as a no-op.
    pub fn register_ignored_conversion<A: Any, B: Any>(&mut self) {
        let pair = self.remember::<A, B>();
        self.ignored.insert(pair);
    }

    /// Whether any conversion is known from `src` to `dst`
    pub fn has_conversion(&self, src: TypeId, dst: TypeId) -> bool {
        let pair = (src, dst);
        self.ignored.contains(&pair)
            || self.conversion_funcs.contains_key(&pair)
            || self.generated_conversion_funcs.contains_key(&pair)
    }

    /// Convert `src` into `dst`, passing `context` through to conversion functions.
    pub fn convert(&self, src: &dyn Any, dst: &mut dyn Any, context: Option<&dyn Any>) -> Result<()> {
        let scope = Scope {
            converter: self,
            context,
        };
        scope.convert_any(src, dst)
    }

    fn name_of(&self, id: TypeId) -> &'static str {
        self.names.get(&id).copied().unwrap_or("<unregistered type>")
    }
}

/// Handed to every conversion function so it can convert nested values and
/// read the caller's context.
pub struct Scope<'a> {
    converter: &'a Converter,
    context: Option<&'a dyn Any>,
}

impl Scope<'_> {
    /// Convert a nested value through the same converter
    pub fn convert<A: Any, B: Any>(&self, src: &A, dst: &mut B) -> Result<()> {
        self.convert_any(src, dst)
    }

    /// The opaque context passed by the caller
    pub fn context(&self) -> Option<&dyn Any> {
        self.context
    }

    /// The context, if it has type `T`
    pub fn context_as<T: Any>(&self) -> Option<&T> {
        self.context.and_then(|c| c.downcast_ref())
    }

    /// The converter this scope belongs to
    pub fn converter(&self) -> &Converter {
        self.converter
    }

    fn convert_any(&self, src: &dyn Any, dst: &mut dyn Any) -> Result<()> {
        let pair = ((*src).type_id(), (*dst).type_id());
        if self.converter.ignored.contains(&pair) {
            tracing::trace!(src = self.converter.name_of(pair.0), "ignored conversion");
            return Ok(());
        }
        if let Some(f) = self.converter.conversion_funcs.get(&pair) {
            return f(src, dst, self);
        }
        if let Some(f) = self.converter.generated_conversion_funcs.get(&pair) {
            return f(src, dst, self);
        }
        Err(Error::conversion(format!(
            "converting (src) {} to (dst) {}: no conversion function registered",
            self.converter.name_of(pair.0),
            self.converter.name_of(pair.1)
        )))
    }
}
