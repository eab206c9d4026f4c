//! Resolution, verification and patching against the fixture codebase.

use super::fixture_workspace;
use std::fs;
use tracefix::patch::{NamingPolicy, PatchWriter};
use tracefix::resolve::{PathResolver, ResolveError};
use tracefix::verify::{self, ClaimFragment, ClaimOutcome, MatchMode, SnippetClaim};
use tracefix::{source, syntax};

const REPORTED: &str = "/usr/srv/app/services/user.py";

#[test]
fn reported_path_joins_onto_root_in_full() {
    let (_dir, root) = fixture_workspace();
    let resolver = PathResolver::with_root(&root).unwrap();
    let canonical_root = root.canonicalize().unwrap();

    let user = resolver.resolve(REPORTED).unwrap();
    assert!(user.is_resolved());
    assert_eq!(
        user.local(),
        canonical_root.join("usr/srv/app/services/user.py")
    );

    let models = resolver.resolve("/usr/srv/app/models.py").unwrap();
    assert!(!models.is_resolved());
    assert_eq!(models.local(), canonical_root.join("usr/srv/app/models.py"));
    assert!(matches!(
        models.require(),
        Err(ResolveError::NotFound { .. })
    ));
}

#[test]
fn strip_prefix_maps_deployment_paths_onto_checkout() {
    let (_dir, root) = fixture_workspace();
    let app = root.join("usr/srv/app");
    let resolver = PathResolver::with_root(&app)
        .unwrap()
        .strip_prefix("/usr/srv/app");

    let user = resolver.resolve(REPORTED).unwrap();
    assert!(user.is_resolved());
    assert_eq!(
        user.local(),
        app.canonicalize().unwrap().join("services/user.py")
    );

    // Partial segment matches are not stripped
    let other = resolver.resolve("/usr/srv/application/x.py").unwrap();
    assert!(other.local().ends_with("usr/srv/application/x.py"));
}

#[test]
fn windows_paths_drop_the_drive() {
    let (_dir, root) = fixture_workspace();
    let resolver = PathResolver::with_root(&root)
        .unwrap()
        .strip_prefix("/deploy");

    let resolved = resolver
        .resolve(r"C:\deploy\usr\srv\app\services\user.py")
        .unwrap();
    assert!(resolved.is_resolved());
    assert_eq!(resolved.reported(), r"C:\deploy\usr\srv\app\services\user.py");
}

#[test]
fn traversal_never_leaves_the_root() {
    let (_dir, root) = fixture_workspace();
    let resolver = PathResolver::with_root(&root).unwrap();

    for reported in [
        "../outside.py",
        "/usr/srv/app/../../../../etc/passwd",
        r"..\..\secrets.txt",
    ] {
        assert!(
            matches!(
                resolver.resolve(reported),
                Err(ResolveError::PathTraversalRejected { .. })
            ),
            "{reported} should be rejected"
        );
    }
}

#[test]
fn verify_is_exact_and_rereads_the_file() {
    let (_dir, root) = fixture_workspace();
    let resolver = PathResolver::with_root(&root).unwrap();
    let user = resolver.resolve(REPORTED).unwrap();

    assert!(verify::verify(&user, "filter(User.emails == data.email)").unwrap());
    assert!(!verify::verify(&user, "def missing_method").unwrap());
    // Whitespace matters unless trimmed matching is requested
    assert!(!verify::verify(&user, "if user_exist:\n    raise").unwrap());

    let content = source::read(&user).unwrap().content;
    let trimmed = verify::locate(
        &content,
        "if user_exist:\nraise HTTPException(status_code=400, detail=\"Email is already exists.\")",
        MatchMode::LineTrimmed,
        1,
    );
    assert!(trimmed.found);
    assert_eq!(trimmed.line_number, Some(8));

    fs::write(user.local(), "class User:\n    pass\n").unwrap();
    assert!(!verify::verify(&user, "User.emails").unwrap());
}

#[test]
fn line_range_claims() {
    let (_dir, root) = fixture_workspace();
    let resolver = PathResolver::with_root(&root).unwrap();
    let user = resolver.resolve(REPORTED).unwrap();

    let line_seven = source::read_lines(&user, 7, 7).unwrap();
    assert!(line_seven.contains("User.emails"));

    let present = SnippetClaim {
        path: user.clone(),
        fragment: ClaimFragment::Lines {
            start: 7,
            end: 7,
            expected: line_seven,
        },
    };
    assert_eq!(verify::verify_claim(&present).unwrap(), ClaimOutcome::Present);

    let out_of_range = SnippetClaim {
        path: user,
        fragment: ClaimFragment::Lines {
            start: 500,
            end: 501,
            expected: String::new(),
        },
    };
    assert_eq!(
        verify::verify_claim(&out_of_range).unwrap(),
        ClaimOutcome::Absent
    );
}

#[test]
fn patch_lands_beside_original_and_validates() {
    let (_dir, root) = fixture_workspace();
    let resolver = PathResolver::with_root(&root).unwrap();
    let user = resolver.resolve(REPORTED).unwrap();
    let original = fs::read_to_string(user.local()).unwrap();

    let fixed = original.replace("User.emails", "User.email");
    let result = PatchWriter::default().write_to(user.require().unwrap(), &fixed);

    assert!(result.success, "{result}");
    let output = result.output.unwrap();
    assert_eq!(output, user.local().with_file_name("fixed_user.py"));
    assert_eq!(fs::read_to_string(&output).unwrap(), fixed);
    assert_eq!(fs::read_to_string(user.local()).unwrap(), original);

    let validation = syntax::validate_file(&output).unwrap();
    assert!(validation.valid, "{:?}", validation.diagnostics);
}

#[test]
fn invalid_patch_stays_on_disk_for_inspection() {
    let (_dir, root) = fixture_workspace();
    let resolver = PathResolver::with_root(&root).unwrap();
    let user = resolver.resolve(REPORTED).unwrap();

    let writer = PatchWriter::new(NamingPolicy::prefixed("broken_").unwrap());
    let result = writer.write_to(user.local(), "async def create_user_account(data:\n");
    assert!(result.success);

    let output = result.output.unwrap();
    let validation = syntax::validate_file(&output).unwrap();
    assert!(!validation.valid);
    assert!(validation.summary().is_some());
    assert!(output.exists());
    assert!(output.ends_with("services/broken_user.py"));
}
