use crate::gl::Gl;

/// A rendering context the pipeline's components are associated with.
///
/// `enter` makes the context current on the calling thread and returns
/// whatever is needed to put the previous context back; `leave` does that.
/// Components never call the pair directly: they go through
/// [`ScopedCurrent`], which guarantees `leave` runs on every exit path.
///
/// Construction and teardown of GPU objects happen inside such a scope. The
/// per-frame hooks assume the host already made the context current.
pub trait RenderContext {
    type Api: Gl;
    type Saved;

    fn gl(&self) -> &Self::Api;
    fn enter(&self) -> Self::Saved;
    fn leave(&self, saved: Self::Saved);
}

/// RAII guard that keeps a context current for its lifetime.
///
/// Scopes nest: entering a context that is already current saves and later
/// restores that same context.
pub struct ScopedCurrent<'a, C: RenderContext + ?Sized> {
    context: &'a C,
    saved: Option<C::Saved>,
}

impl<'a, C: RenderContext + ?Sized> ScopedCurrent<'a, C> {
    pub fn enter(context: &'a C) -> Self {
        let saved = context.enter();
        Self {
            context,
            saved: Some(saved),
        }
    }

    pub fn gl(&self) -> &C::Api {
        self.context.gl()
    }
}

impl<C: RenderContext + ?Sized> Drop for ScopedCurrent<'_, C> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.context.leave(saved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::{SoftContext, SoftDisplay};

    #[test]
    fn scope_restores_previous_context_on_drop() {
        let display = SoftDisplay::new();
        let first = display.create_context(4, 4);
        let second = display.create_context(4, 4);
        display.make_current(Some(&first));

        {
            let _scope = ScopedCurrent::enter(&second);
            assert_eq!(display.current(), Some(second.tag()));
        }

        assert_eq!(display.current(), Some(first.tag()));
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let display = SoftDisplay::new();
        let first = display.create_context(4, 4);
        let second = display.create_context(4, 4);
        display.make_current(None);

        {
            let _outer = ScopedCurrent::enter(&first);
            {
                let _inner = ScopedCurrent::enter(&second);
                assert_eq!(display.current(), Some(second.tag()));
            }
            assert_eq!(display.current(), Some(first.tag()));
        }

        assert_eq!(display.current(), None);
    }

    #[test]
    fn scope_restores_after_early_return() {
        fn bail_inside(context: &SoftContext) -> Option<()> {
            let _scope = ScopedCurrent::enter(context);
            let missing: Option<()> = None;
            missing?;
            Some(())
        }

        let display = SoftDisplay::new();
        let first = display.create_context(2, 2);
        let second = display.create_context(2, 2);
        display.make_current(Some(&first));

        assert!(bail_inside(&second).is_none());
        assert_eq!(display.current(), Some(first.tag()));
    }
}
