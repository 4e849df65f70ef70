//! Integration tests for the flat-file identity backend.

use idstore_core::{Claim, Login, Role, User};
use idstore_fs::{FilesystemConfig, FilesystemIdentityDb, RoleStore, UserStore};
use idstore_storage::StorageError;
use tempfile::TempDir;

async fn open_store() -> (TempDir, FilesystemIdentityDb) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = FilesystemConfig::new(dir.path());
    let db = FilesystemIdentityDb::open(&config).await.expect("open");
    (dir, db)
}

#[tokio::test]
async fn bootstrap_creates_full_skeleton() {
    let (dir, _db) = open_store().await;

    // Exactly 1296 two-character bucket directories under users/.
    let mut buckets = 0;
    let mut entries = tokio::fs::read_dir(dir.path().join("users")).await.expect("read users");
    while let Some(entry) = entries.next_entry().await.expect("entry") {
        assert!(entry.path().is_dir());
        let name = entry.file_name();
        assert_eq!(name.to_str().expect("utf8").len(), 2);
        buckets += 1;
    }
    assert_eq!(buckets, 1296);

    for sibling in ["users-by-name", "roles", "roles-by-name"] {
        assert!(dir.path().join(sibling).is_dir(), "missing {sibling}");
    }
}

#[tokio::test]
async fn reopening_is_idempotent_but_partial_trees_fail() {
    let (dir, _db) = open_store().await;

    // Re-opening a provisioned tree succeeds.
    let config = FilesystemConfig::new(dir.path());
    FilesystemIdentityDb::open(&config).await.expect("reopen");

    // A tree with users/ but missing substructure fails fast.
    let partial = tempfile::tempdir().expect("tempdir");
    tokio::fs::create_dir(partial.path().join("users"))
        .await
        .expect("mkdir");
    let err = FilesystemIdentityDb::open(&FilesystemConfig::new(partial.path()))
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
}

#[tokio::test]
async fn user_lifecycle_and_lookups() {
    let (dir, db) = open_store().await;
    let users = db.users();

    let user = User::new("ab42", "Bob", "BOB").with_email("Bob@Example.com", "BOB@EXAMPLE.COM");
    let created = users.create_user(&user).await.expect("create");

    // The record lands in its bucket.
    assert!(dir.path().join("users/ab/ab42").is_file());

    let fetched = users.find_by_id("ab42").await.expect("find").expect("some");
    assert_eq!(fetched.user_name, "Bob");
    assert_eq!(fetched.normalized_user_name, "BOB");

    // Any case variant of the normalized name resolves.
    for variant in ["BOB", "bob", "BoB"] {
        let found = users
            .find_by_normalized_username(variant)
            .await
            .expect("find by name");
        assert_eq!(found.expect("some").id, "ab42", "variant {variant}");
    }
    let by_email = users
        .find_by_normalized_email("bob@example.com")
        .await
        .expect("find by email");
    assert_eq!(by_email.expect("some").id, "ab42");

    // Duplicate create conflicts.
    assert!(users.create_user(&user).await.unwrap_err().is_already_exists());

    // Update regenerates the stamp; a stale writer is rejected.
    let mut edited = fetched.clone();
    edited.phone_number = Some("555-0100".into());
    let updated = users.update_user(&edited).await.expect("update");
    assert_ne!(updated.concurrency_stamp, created.concurrency_stamp);
    assert!(
        users
            .update_user(&edited)
            .await
            .unwrap_err()
            .is_concurrency_conflict()
    );

    // Scalar setters persist without touching the stamp.
    users
        .set_password_hash("ab42", Some("hash-1"))
        .await
        .expect("set hash");
    assert_eq!(
        users.password_hash("ab42").await.expect("hash").as_deref(),
        Some("hash-1")
    );
    let after = users.find_by_id("ab42").await.expect("find").expect("some");
    assert_eq!(after.concurrency_stamp, updated.concurrency_stamp);

    assert_eq!(
        users
            .increment_access_failed_count("ab42")
            .await
            .expect("increment"),
        1
    );
    users.reset_access_failed_count("ab42").await.expect("reset");
    assert_eq!(users.access_failed_count("ab42").await.expect("count"), 0);

    // Changing the normalized email re-keys the email lookup.
    users
        .set_email("ab42", Some("robert@example.com"))
        .await
        .expect("set email");
    users
        .set_normalized_email("ab42", Some("ROBERT@EXAMPLE.COM"))
        .await
        .expect("set normalized email");
    assert!(
        users
            .find_by_normalized_email("bob@example.com")
            .await
            .expect("old email")
            .is_none()
    );
    assert_eq!(
        users
            .find_by_normalized_email("robert@example.com")
            .await
            .expect("new email")
            .expect("some")
            .id,
        "ab42"
    );
    assert_eq!(
        users.email("ab42").await.expect("email").as_deref(),
        Some("robert@example.com")
    );

    let end = time::macros::datetime!(2030-01-01 00:00:00 UTC);
    users
        .set_lockout_end("ab42", Some(end))
        .await
        .expect("set lockout");
    assert_eq!(users.lockout_end("ab42").await.expect("lockout"), Some(end));
    users.set_lockout_end("ab42", None).await.expect("clear lockout");
    assert_eq!(users.lockout_end("ab42").await.expect("lockout"), None);
}

#[tokio::test]
async fn renaming_rekeys_the_lookup() {
    let (dir, db) = open_store().await;
    let users = db.users();

    users
        .create_user(&User::new("ab42", "Bob", "BOB"))
        .await
        .expect("create");
    users
        .set_normalized_user_name("ab42", "ROBERT")
        .await
        .expect("rename");

    assert!(
        users
            .find_by_normalized_username("bob")
            .await
            .expect("old name")
            .is_none()
    );
    assert_eq!(
        users
            .find_by_normalized_username("robert")
            .await
            .expect("new name")
            .expect("some")
            .id,
        "ab42"
    );

    // The old prefix file no longer mentions the user.
    let old = tokio::fs::read_to_string(dir.path().join("users-by-name/bo"))
        .await
        .expect("old prefix file");
    assert!(!old.contains("ab42"));
}

#[tokio::test]
async fn lookup_rewrite_is_idempotent() {
    let (dir, db) = open_store().await;
    let users = db.users();

    users
        .create_user(&User::new("ab42", "Alice", "ALICE"))
        .await
        .expect("create alice");
    users
        .create_user(&User::new("cd42", "Albert", "ALBERT"))
        .await
        .expect("create albert");

    let path = dir.path().join("users-by-name/al");
    let first = tokio::fs::read_to_string(&path).await.expect("read");

    // Re-keying to the same value rewrites the same mapping.
    users
        .set_normalized_user_name("ab42", "ALICE")
        .await
        .expect("rewrite");
    let second = tokio::fs::read_to_string(&path).await.expect("read");

    assert_eq!(first, second);
}

#[tokio::test]
async fn delete_user_cascades() {
    let (dir, db) = open_store().await;
    let users = db.users();
    let roles = db.roles();

    roles
        .create_role(&Role::new("r1ab", "Admin", "ADMIN"))
        .await
        .expect("create role");

    let user = User::new("ab42", "Bob", "BOB").with_email("b@e.com", "B@E.COM");
    users.create_user(&user).await.expect("create");
    users
        .add_claims("ab42", &[Claim::new("dept", "eng")])
        .await
        .expect("claims");
    users
        .add_login("ab42", &Login::new("google", "g-123", "Google"))
        .await
        .expect("login");
    users.add_to_role("ab42", "admin").await.expect("role");

    users.delete_user("ab42").await.expect("delete");

    assert!(users.find_by_id("ab42").await.expect("find").is_none());
    assert!(
        users
            .find_by_normalized_username("bob")
            .await
            .expect("by name")
            .is_none()
    );
    assert!(
        users
            .find_by_normalized_email("b@e.com")
            .await
            .expect("by email")
            .is_none()
    );
    assert!(
        users
            .find_by_login("google", "g-123")
            .await
            .expect("by login")
            .is_none()
    );
    assert!(!dir.path().join("users/ab/ab42").exists());

    let err = users.delete_user("ab42").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn malformed_records_fail_closed() {
    let (dir, db) = open_store().await;
    let users = db.users();

    // Unknown field in a user record aborts the read.
    tokio::fs::write(
        dir.path().join("users/ab/ab42"),
        r#"{"UserName":"Bob","FavoriteColor":"green"}"#,
    )
    .await
    .expect("write record");
    let err = users.find_by_id("ab42").await.unwrap_err();
    assert!(err.is_invalid_record());

    // A lookup file with a trailing unpaired line aborts the lookup.
    tokio::fs::write(dir.path().join("users-by-name/bo"), "bob\nab42\norphan\n")
        .await
        .expect("write lookup");
    let err = users.find_by_normalized_username("bob").await.unwrap_err();
    assert!(err.is_invalid_record());
}

#[tokio::test]
async fn role_lifecycle_and_membership() {
    let (_dir, db) = open_store().await;
    let users = db.users();
    let roles = db.roles();

    let created = roles
        .create_role(&Role::new("r1ab", "Admin", "ADMIN"))
        .await
        .expect("create role");

    assert_eq!(
        roles.role_name("r1ab").await.expect("name").as_deref(),
        Some("Admin")
    );
    assert_eq!(
        roles
            .find_by_normalized_name("admin")
            .await
            .expect("find")
            .expect("some")
            .id,
        "r1ab"
    );

    // Claims: add one, list exactly that one, remove it.
    let claim = Claim::new("dept", "eng");
    roles.add_claim("r1ab", &claim).await.expect("add claim");
    assert_eq!(
        roles.claims_for_role("r1ab").await.expect("claims"),
        vec![claim.clone()]
    );
    roles.remove_claim("r1ab", &claim).await.expect("remove claim");
    assert!(roles.claims_for_role("r1ab").await.expect("claims").is_empty());

    // Stale-stamp update is rejected.
    let mut edited = created.clone();
    edited.name = "Administrator".into();
    edited.normalized_name = "ADMINISTRATOR".into();
    let updated = roles.update_role(&edited).await.expect("update");
    assert_ne!(updated.concurrency_stamp, created.concurrency_stamp);
    assert!(
        roles
            .update_role(&edited)
            .await
            .unwrap_err()
            .is_concurrency_conflict()
    );
    // The rename re-keyed the lookup.
    assert!(
        roles
            .find_by_normalized_name("admin")
            .await
            .expect("old")
            .is_none()
    );

    // Membership through the user store.
    users
        .create_user(&User::new("ab42", "Bob", "BOB"))
        .await
        .expect("create user");
    users
        .add_to_role("ab42", "ADMINISTRATOR")
        .await
        .expect("add to role");
    assert!(users.is_in_role("ab42", "administrator").await.expect("in role"));
    assert_eq!(
        users.role_names_for_user("ab42").await.expect("names"),
        vec!["Administrator".to_string()]
    );
    let members = users
        .users_in_role("administrator")
        .await
        .expect("users in role");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, "ab42");

    // Unknown role memberships error; unknown role listings are empty.
    assert!(
        users
            .add_to_role("ab42", "missing")
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(users.users_in_role("missing").await.expect("empty").is_empty());

    // Deleting the role scrubs the membership.
    roles.delete_role("r1ab").await.expect("delete role");
    assert!(
        users
            .role_names_for_user("ab42")
            .await
            .expect("names")
            .is_empty()
    );
    assert!(roles.find_by_id("r1ab").await.expect("find").is_none());
}

#[tokio::test]
async fn claims_replace_remove_and_query() {
    let (_dir, db) = open_store().await;
    let users = db.users();

    users
        .create_user(&User::new("ab42", "Bob", "BOB"))
        .await
        .expect("create bob");
    users
        .create_user(&User::new("cd42", "Eve", "EVE"))
        .await
        .expect("create eve");

    let dept_eng = Claim::new("dept", "eng");
    users
        .add_claims("ab42", &[dept_eng.clone(), Claim::new("level", "2")])
        .await
        .expect("bob claims");
    users
        .add_claims("cd42", &[dept_eng.clone()])
        .await
        .expect("eve claims");

    let holders = users.users_for_claim(&dept_eng).await.expect("holders");
    let ids: Vec<&str> = holders.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["ab42", "cd42"]);

    let dept_ops = Claim::new("dept", "ops");
    users
        .replace_claim("ab42", &dept_eng, &dept_ops)
        .await
        .expect("replace");
    let claims = users.claims_for_user("ab42").await.expect("claims");
    assert!(claims.contains(&dept_ops));
    assert!(!claims.contains(&dept_eng));

    users
        .remove_claims("cd42", &[dept_eng.clone()])
        .await
        .expect("remove");
    assert!(users.claims_for_user("cd42").await.expect("claims").is_empty());
}

#[tokio::test]
async fn logins_add_remove_and_find() {
    let (_dir, db) = open_store().await;
    let users = db.users();

    users
        .create_user(&User::new("ab42", "Bob", "BOB"))
        .await
        .expect("create");

    let login = Login::new("Google", "g-123", "Google");
    users.add_login("ab42", &login).await.expect("add login");

    // Duplicate (provider, key) is a conflict.
    assert!(
        users
            .add_login("ab42", &login)
            .await
            .unwrap_err()
            .is_already_exists()
    );

    assert_eq!(
        users.logins_for_user("ab42").await.expect("logins"),
        vec![login.clone()]
    );
    // Provider matching is exact, like the relational backend.
    assert_eq!(
        users
            .find_by_login("Google", "g-123")
            .await
            .expect("find")
            .expect("some")
            .id,
        "ab42"
    );
    assert!(
        users
            .find_by_login("google", "g-123")
            .await
            .expect("find")
            .is_none()
    );

    users
        .remove_login("ab42", "Google", "g-123")
        .await
        .expect("remove");
    assert!(users.logins_for_user("ab42").await.expect("logins").is_empty());
    assert!(
        users
            .find_by_login("Google", "g-123")
            .await
            .expect("find")
            .is_none()
    );
    // Removing again is a no-op.
    users
        .remove_login("ab42", "Google", "g-123")
        .await
        .expect("remove again");
}
