//! Sidecar inspection and descriptor mutation against real temp directories.

use assert_fs::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use shopnode_core::{
    publication::{self, DESCRIPTOR_FILE, SIDECAR_FILE},
    Cid, MetadataError, PublicationSidecar,
};

fn sidecar() -> PublicationSidecar {
    PublicationSidecar {
        cid: "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG".into(),
        gateway: "http://localhost:8080".into(),
    }
}

// ---------------------------------------------------------------------------
// 1. Inspection
// ---------------------------------------------------------------------------

#[test]
fn missing_sidecar_means_not_published() {
    let shop = assert_fs::TempDir::new().expect("tempdir");
    let record = publication::inspect(shop.path()).expect("inspect");
    assert!(!record.is_published);
    assert_eq!(record.cid, "");
    assert_eq!(record.gateway, "");
}

#[rstest]
#[case::garbage("{ not json")]
#[case::missing_gateway(r#"{"cid":"QmAbc"}"#)]
#[case::wrong_shape(r#"["QmAbc","http://localhost:8080"]"#)]
fn malformed_sidecar_is_an_error(#[case] body: &str) {
    let shop = assert_fs::TempDir::new().expect("tempdir");
    shop.child(SIDECAR_FILE).write_str(body).expect("write");

    let err = publication::inspect(shop.path()).unwrap_err();
    assert!(matches!(err, MetadataError::Json { .. }), "got: {err}");
    assert!(err.to_string().contains(SIDECAR_FILE));
}

#[test]
fn written_sidecar_is_inspected_as_published() {
    let shop = assert_fs::TempDir::new().expect("tempdir");
    publication::write_sidecar(shop.path(), &sidecar()).expect("write");

    shop.child(SIDECAR_FILE)
        .assert(predicate::str::contains("    \"cid\": \"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG\""));
    shop.child(format!("{SIDECAR_FILE}.tmp"))
        .assert(predicate::path::missing());

    let record = publication::inspect(shop.path()).expect("inspect");
    assert!(record.is_published);
    assert_eq!(record.cid, sidecar().cid);
    assert_eq!(record.gateway, "http://localhost:8080");
}

#[test]
fn sidecar_is_overwritten_not_versioned() {
    let shop = assert_fs::TempDir::new().expect("tempdir");
    publication::write_sidecar(shop.path(), &sidecar()).expect("first");
    let next = PublicationSidecar {
        cid: "QmNext".into(),
        gateway: "https://ipfs.io".into(),
    };
    publication::write_sidecar(shop.path(), &next).expect("second");

    let read = publication::read_sidecar(shop.path())
        .expect("read")
        .expect("present");
    assert_eq!(read, next);
}

// ---------------------------------------------------------------------------
// 2. Descriptor mutation
// ---------------------------------------------------------------------------

#[test]
fn descriptor_cid_is_set_and_other_keys_survive() {
    let shop = assert_fs::TempDir::new().expect("tempdir");
    let descriptor = shop.child(DESCRIPTOR_FILE);
    descriptor
        .write_str(r##"{"name":"Acme","primaryColor":"#112233","items":[{"title":"Mug","price":12}]}"##)
        .expect("write");

    let cid = Cid::from("QmAbc");
    publication::set_descriptor_cid(descriptor.path(), &cid).expect("set");

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(descriptor.path()).expect("read"))
            .expect("parse");
    assert_eq!(value["CID"], "QmAbc");
    assert_eq!(value["name"], "Acme");
    assert_eq!(value["items"][0]["price"], 12);
    assert_eq!(
        publication::descriptor_cid(descriptor.path()).expect("cid"),
        Some(cid)
    );
}

#[test]
fn descriptor_cid_replaces_previous_value() {
    let shop = assert_fs::TempDir::new().expect("tempdir");
    let descriptor = shop.child(DESCRIPTOR_FILE);
    descriptor
        .write_str(r#"{"name":"Acme","CID":"QmOld"}"#)
        .expect("write");

    publication::set_descriptor_cid(descriptor.path(), &Cid::from("QmNew")).expect("set");
    descriptor.assert(predicate::str::contains("QmNew").and(predicate::str::contains("QmOld").not()));
}

#[test]
fn non_object_descriptor_is_rejected() {
    let shop = assert_fs::TempDir::new().expect("tempdir");
    let descriptor = shop.child(DESCRIPTOR_FILE);
    descriptor.write_str("[1, 2, 3]").expect("write");

    let err = publication::set_descriptor_cid(descriptor.path(), &Cid::from("QmAbc")).unwrap_err();
    assert!(matches!(err, MetadataError::NotAnObject { .. }), "got: {err}");
    descriptor.assert("[1, 2, 3]");
}

#[test]
fn missing_descriptor_is_an_io_error() {
    let shop = assert_fs::TempDir::new().expect("tempdir");
    let err = publication::set_descriptor_cid(&shop.path().join(DESCRIPTOR_FILE), &Cid::from("QmAbc"))
        .unwrap_err();
    assert!(matches!(err, MetadataError::Io { .. }), "got: {err}");
}
