use crate::ResourceKey;
use crate::Topic;

#[test]
fn test_parse_rejects_malformed_keys() {
    assert!(ResourceKey::parse("").is_err());
    assert!(ResourceKey::parse("docker..abc").is_err());
    assert!(ResourceKey::parse("ups status").is_err());
    assert!(ResourceKey::parse("ups.status").is_ok());
}

#[test]
fn test_topic_is_derived_from_namespace() {
    let key = ResourceKey::parse("docker.container.abc").unwrap();
    assert_eq!(key.namespace(), "docker");
    assert_eq!(Topic::for_key(&key).as_str(), "docker.events");

    let key = ResourceKey::parse("ups").unwrap();
    assert_eq!(Topic::for_key(&key).as_str(), "ups.events");
}
