use super::*;

const fn is_send_sync<T: Send + Sync>() { }
const _: () = {
    is_send_sync::<HeaderCollection>();
};

#[test]
fn header_collection() {
    let mut map = HeaderCollection::new();

    map.set("X-Trace", "a").unwrap();
    map.append("x-trace", "b").unwrap();

    assert_eq!(map.get("X-TRACE").as_deref(), Some("a, b"));
    assert_eq!(map.get_values("x-trace"), ["a", "b"]);
    assert_eq!(map.len(), 1);

    // Replace

    map.set("x-trace", "c").unwrap();
    assert_eq!(map.get_values("X-Trace"), ["c"]);

    // Order

    map.set("Content-Type", "text/plain").unwrap();
    map.set("Accept", "*/*").unwrap();
    let names = map.iter().map(|(name, _)| name).collect::<Vec<_>>();
    assert_eq!(names, ["X-Trace", "Content-Type", "Accept"]);

    // Remove

    assert_eq!(map.remove("content-type").unwrap(), Some(vec!["text/plain".to_owned()]));
    assert!(!map.contains("Content-Type"));
    assert!(map.get("content-type").is_none());
    assert!(map.get_values("content-type").is_empty());

    // Empty set removes

    map.set_values("accept", Vec::<String>::new()).unwrap();
    assert!(!map.contains("accept"));
}

#[test]
fn header_read_only() {
    let mut map = HeaderCollection::new();
    map.set("Server", "khttp").unwrap();
    map.lock();

    assert_eq!(map.set("Server", "other"), Err(HeaderError::ReadOnly));
    assert_eq!(map.append("Vary", "Accept"), Err(HeaderError::ReadOnly));
    assert_eq!(map.remove("Server"), Err(HeaderError::ReadOnly));
    assert_eq!(map.clear(), Err(HeaderError::ReadOnly));
    assert_eq!(map.get("server").as_deref(), Some("khttp"));

    map.unlock();
    map.set("Server", "other").unwrap();
    assert_eq!(map.get("server").as_deref(), Some("other"));
}

#[test]
fn header_validation() {
    let mut map = HeaderCollection::new();
    assert_eq!(map.set("", "a"), Err(HeaderError::InvalidName));
    assert_eq!(map.set("Bad Name", "a"), Err(HeaderError::InvalidName));
    assert_eq!(map.set("X-Ok", "line\r\nInjected: 1"), Err(HeaderError::InvalidValue));
    assert!(map.is_empty());
}

#[test]
fn header_encoding() {
    assert_eq!(encoding::decode(b"plain"), "plain");
    assert_eq!(encoding::decode("caf\u{e9}".as_bytes()), "caf\u{e9}");
    // lone 0xE9 is not utf8
    assert_eq!(encoding::decode(b"caf\xe9"), "caf\u{e9}");
    assert_eq!(encoding::encode("caf\u{e9}"), "caf\u{e9}".as_bytes());
}

#[test]
fn known_headers() {
    assert_eq!(KnownHeader::from_name("content-length"), Some(KnownHeader::ContentLength));
    assert_eq!(KnownHeader::ContentLength.index(), 11);
    assert_eq!(KnownHeader::WwwAuthenticate.index(), 29);
    assert_eq!(KnownHeader::from_index(29), Some(KnownHeader::WwwAuthenticate));
    assert_eq!(KnownHeader::SetCookie.as_str(), "Set-Cookie");
    assert_eq!(KnownHeader::from_name("X-Custom"), None);
    assert!(KnownHeader::from_index(KnownHeader::COUNT).is_none());
}

#[test]
fn connection_tokens() {
    assert!(contains_token("keep-alive, Close", "close"));
    assert!(!contains_token("keep-alive", "close"));
}
