//! Ambient, request-scoped tag context.
//!
//! Threading a [`TagSet`] through every call that might need it is
//! untenable, so the current tag set is carried on a thread-local stack of
//! immutable [`Context`] snapshots. [`Context::attach`] pushes a new
//! snapshot and returns a guard that restores the previous one when
//! dropped, so nested scopes compose the way nested function calls do.

use std::cell::RefCell;
use std::sync::Arc;

use crate::tag::TagSet;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// An immutable, execution-scoped carrier for the current [`TagSet`].
#[derive(Clone, Debug, Default)]
pub struct Context {
    tags: Option<Arc<TagSet>>,
}

impl Context {
    /// An empty context carrying no tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// The context attached on the current thread, or an empty context if
    /// none is attached.
    pub fn current() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }

    /// A copy of this context with `tag_set` installed, replacing any tag
    /// set it previously carried.
    pub fn with_tagset(&self, tag_set: TagSet) -> Context {
        Context {
            tags: Some(Arc::new(tag_set)),
        }
    }

    /// The [`TagSet`] carried by this context, or an empty one if none was
    /// installed.
    pub fn tagset(&self) -> TagSet {
        self.tags.as_deref().cloned().unwrap_or_default()
    }

    /// Install this context as current on this thread. The previous
    /// context (if any) is restored when the returned guard is dropped.
    #[must_use = "the context is detached again as soon as the guard is dropped"]
    pub fn attach(self) -> ContextGuard {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(self));
        ContextGuard(())
    }
}

/// Restores the previous [`Context`] on drop.
#[derive(Debug)]
pub struct ContextGuard(());

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Returns a copy of `ctx` with `tag_set` installed.
pub fn context_with_tagset(ctx: &Context, tag_set: TagSet) -> Context {
    ctx.with_tagset(tag_set)
}

/// Returns the [`TagSet`] carried by `ctx`, or an empty one.
pub fn tagset_from_context(ctx: &Context) -> TagSet {
    ctx.tagset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{new_key, KeyKind};
    use crate::tag::{Behavior, TagSetBuilder};

    #[test]
    fn empty_context_has_empty_tagset() {
        let ctx = Context::new();
        assert!(tagset_from_context(&ctx).is_empty());
    }

    #[test]
    fn attach_installs_and_detach_restores() {
        let k = new_key("context_test_key", KeyKind::String).unwrap();
        let ts = TagSetBuilder::start_empty()
            .upsert(k, "v", Behavior::AddOrReplace)
            .unwrap()
            .build();

        assert!(Context::current().tagset().is_empty());
        {
            let _guard = Context::current().with_tagset(ts.clone()).attach();
            assert_eq!(Context::current().tagset(), ts);
        }
        assert!(Context::current().tagset().is_empty());
    }

    #[test]
    fn nested_attach_restores_parent_on_drop() {
        let k = new_key("context_nested_key", KeyKind::String).unwrap();
        let outer = TagSetBuilder::start_empty()
            .upsert(k.clone(), "outer", Behavior::AddOrReplace)
            .unwrap()
            .build();
        let inner = TagSetBuilder::start_empty()
            .upsert(k, "inner", Behavior::AddOrReplace)
            .unwrap()
            .build();

        let _outer_guard = Context::current().with_tagset(outer.clone()).attach();
        assert_eq!(Context::current().tagset(), outer);
        {
            let _inner_guard = Context::current().with_tagset(inner.clone()).attach();
            assert_eq!(Context::current().tagset(), inner);
        }
        assert_eq!(Context::current().tagset(), outer);
    }
}
