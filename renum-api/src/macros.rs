//! Internal macros for the API crate

/// Implement `FromRef<AppState>` for a field, so extractors can pull the
/// field straight out of the shared state.
#[macro_export]
macro_rules! impl_from_ref {
    ($ty:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $ty {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
