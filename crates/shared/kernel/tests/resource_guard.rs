use centra_kernel::security::resource::ResourceGuard;

#[test]
fn resource_guard_validates_and_prefixes() {
    assert_eq!(ResourceGuard::verify("license:123", "license").unwrap(), "license:123");

    assert_eq!(ResourceGuard::verify("123", "license").unwrap(), "license:123");

    assert!(ResourceGuard::verify("local:123", "license").is_err());
}
