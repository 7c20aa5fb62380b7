//! Loop collapse for revisited steps.

use tracing::debug;

use crate::core::types::{RoutingToken, StepIdentity, VisitedPath};

/// Trim `path` and `token` back to the first visit of `step`.
///
/// When `step` already appears in `path`, the conversation looped back to it:
/// both sequences are truncated to the position of its first (leftmost)
/// occurrence, so the step decides again as if reached for the first time.
/// Otherwise, including for an empty path, both are returned unchanged.
pub fn collapse(
    mut path: VisitedPath,
    mut token: RoutingToken,
    step: &StepIdentity,
) -> (VisitedPath, RoutingToken) {
    let Some(first_visit) = path.iter().position(|visited| visited == step) else {
        return (path, token);
    };
    debug!(
        step = %step,
        depth = path.len(),
        first_visit,
        "collapsing revisit"
    );
    path.truncate(first_visit);
    token.truncate(first_visit);
    (path, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(names: &[&str]) -> VisitedPath {
        names.iter().map(|name| StepIdentity::from(*name)).collect()
    }

    #[test]
    fn collapse_truncates_at_first_visit() {
        let (p, t) = collapse(
            path(&["a", "b", "c"]),
            RoutingToken::from(&[0, 1, 2][..]),
            &StepIdentity::from("b"),
        );
        assert_eq!(p, path(&["a"]));
        assert_eq!(t, RoutingToken::from(&[0][..]));
    }

    #[test]
    fn collapse_uses_leftmost_occurrence() {
        let (p, t) = collapse(
            path(&["x", "a", "y", "a"]),
            RoutingToken::from(&[3, 1, 4, 1][..]),
            &StepIdentity::from("a"),
        );
        assert_eq!(p, path(&["x"]));
        assert_eq!(t, RoutingToken::from(&[3][..]));
    }

    #[test]
    fn collapse_revisit_of_first_step_empties_both() {
        let (p, t) = collapse(
            path(&["a"]),
            RoutingToken::from(&[1][..]),
            &StepIdentity::from("a"),
        );
        assert!(p.is_empty());
        assert!(t.is_empty());
    }

    #[test]
    fn collapse_empty_path_keeps_token() {
        let (p, t) = collapse(
            Vec::new(),
            RoutingToken::from(&[1][..]),
            &StepIdentity::from("a"),
        );
        assert!(p.is_empty());
        assert_eq!(t, RoutingToken::from(&[1][..]));
    }

    #[test]
    fn collapse_keeps_short_token_when_truncating() {
        let (p, t) = collapse(
            path(&["a", "b", "c"]),
            RoutingToken::from(&[5][..]),
            &StepIdentity::from("c"),
        );
        assert_eq!(p, path(&["a", "b"]));
        assert_eq!(t, RoutingToken::from(&[5][..]));
    }

    proptest! {
        #[test]
        fn collapse_is_noop_for_unvisited_step(
            names in prop::collection::vec("[a-e]", 0..6),
            choices in prop::collection::vec(0usize..5, 0..6),
        ) {
            let visited: VisitedPath = names.iter().map(|n| StepIdentity::new(n.as_str())).collect();
            let token = RoutingToken::from(&choices[..]);
            let outsider = StepIdentity::from("z");
            let (p, t) = collapse(visited.clone(), token.clone(), &outsider);
            prop_assert_eq!(p, visited);
            prop_assert_eq!(t, token);
        }
    }
}
