use std::{fmt, sync::Arc};

use bytes::{BufMut, Bytes, BytesMut};

use super::{CAContentProvider, Listener};

/// Several CA providers presented as one bundle
///
/// The bundle is every member's content in order, each ending in a newline.
#[derive(Clone, Default)]
pub struct UnionCAContent(pub Vec<Arc<dyn CAContentProvider>>);

impl fmt::Debug for UnionCAContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnionCAContent").field(&self.name()).finish()
    }
}

impl CAContentProvider for UnionCAContent {
    fn name(&self) -> String {
        self.0.iter().map(|p| p.name()).collect::<Vec<_>>().join(",")
    }

    fn current_ca_bundle_content(&self) -> Bytes {
        let mut bundle = BytesMut::new();
        for provider in &self.0 {
            let content = provider.current_ca_bundle_content();
            if content.is_empty() {
                continue;
            }
            bundle.put_slice(&content);
            if !content.ends_with(b"\n") {
                bundle.put_u8(b'\n');
            }
        }
        bundle.freeze()
    }

    fn add_listener(&self, listener: Arc<dyn Listener>) {
        for provider in &self.0 {
            provider.add_listener(listener.clone());
        }
    }
}
