//! Property tests for resolution and patch naming.

use proptest::prelude::*;
use std::fs;
use tracefix::patch::PatchWriter;
use tracefix::resolve::{PathResolver, ResolveError};
use tracefix::verify;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

fn relative_path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn resolve_is_idempotent(segments in relative_path(), windows in any::<bool>()) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = PathResolver::with_root(dir.path()).unwrap();
        let sep = if windows { "\\" } else { "/" };
        let reported = format!("{sep}{}", segments.join(sep));

        let first = resolver.resolve(&reported).unwrap();
        let second = resolver.resolve(&reported).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert!(first.local().starts_with(resolver.root().unwrap()));
        prop_assert!(!first.is_resolved());
    }

    #[test]
    fn any_parent_segment_is_rejected(
        before in relative_path(),
        after in relative_path(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = PathResolver::with_root(dir.path()).unwrap();
        let reported = format!("/{}/../{}", before.join("/"), after.join("/"));

        let rejected = matches!(
            resolver.resolve(&reported),
            Err(ResolveError::PathTraversalRejected { .. })
        );
        prop_assert!(rejected);
    }

    #[test]
    fn patch_output_never_equals_original(
        stem in "[a-z][a-z0-9_]{0,11}",
        body in "[ -~\n]{0,200}",
    ) {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join(format!("{stem}.py"));
        fs::write(&original, "pass\n").unwrap();

        let result = PatchWriter::default().write_to(&original, &body);

        prop_assert!(result.success);
        let output = result.output.unwrap();
        prop_assert_ne!(&output, &original);
        prop_assert_eq!(output.parent(), original.parent());
        prop_assert_eq!(fs::read_to_string(&original).unwrap(), "pass\n");
        prop_assert_eq!(fs::read_to_string(&output).unwrap(), body);
    }

    #[test]
    fn any_substring_verifies(content in "[ -~\n]{1,200}", a in 0usize..200, b in 0usize..200) {
        let (a, b) = (a % content.len(), b % content.len());
        let (start, end) = (a.min(b), a.max(b));
        let snippet = &content[start..=end];
        prop_assert!(verify::verify_text(&content, snippet));
    }
}
