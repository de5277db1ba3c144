use super::*;

#[test]
fn slugify_collapses_punctuation() {
    assert_eq!(slugify("Summer Sale -- 2024!"), "summer-sale-2024");
    assert_eq!(slugify("  About Us  "), "about-us");
    assert_eq!(slugify("???"), "");
}

#[test]
fn unique_slug_appends_counter() {
    let taken = ["home", "home-2"];
    assert_eq!(unique_slug("home", |s| taken.contains(&s)), "home-3");
    assert_eq!(unique_slug("about", |s| taken.contains(&s)), "about");
}

#[test]
fn generated_secrets_are_prefixed_hex() {
    let secret = generate_secret("whsec_");
    assert!(secret.starts_with("whsec_"));
    assert_eq!(secret.len(), "whsec_".len() + 48);
    assert_ne!(secret, generate_secret("whsec_"));
}

#[test]
fn sha256_hex_known_vector() {
    assert_eq!(
        sha256_hex("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn email_shape() {
    assert!(is_valid_email("ana@shop.io"));
    assert!(!is_valid_email("ana"));
    assert!(!is_valid_email("@shop.io"));
    assert!(!is_valid_email("ana@shop"));
    assert!(!is_valid_email("ana @shop.io"));
    assert!(!is_valid_email("a@b@c.io"));
}

#[test]
fn now_ms_is_positive() {
    assert!(now_ms() > 1_600_000_000_000);
}
