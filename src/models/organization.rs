//! Organization records and the membership gate

use serde_json::Value;

use super::{int_field, str_field, str_list};

/// Denormalized copy of the newest message plus the set of users who have
/// seen it. Lets clients show unread state without reading the whole log.
///
/// `seen_by` only ever grows: a new message does not clear it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastMessage {
    pub content: String,
    pub sender: String,
    pub timestamp: i64,
    pub seen_by: Vec<String>,
}

impl LastMessage {
    pub fn from_value(v: &Value) -> Self {
        Self {
            content: str_field(v, "content"),
            sender: str_field(v, "senderId"),
            timestamp: int_field(v, "timestamp"),
            seen_by: str_list(v, "seenBy"),
        }
    }
}

/// A named group with one owner, a member set and one announcement log.
///
/// The owner is never in `members`; ownership carries all rights
/// implicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub code: String,
    pub owner: String,
    pub avatar_index: i64,
    pub members: Vec<String>,
    pub last_message: Option<LastMessage>,
}

impl Organization {
    /// Decode a raw store document. Never fails; missing or mistyped
    /// fields default to their zero value.
    pub fn from_value(v: &Value) -> Self {
        Self {
            id: str_field(v, "id"),
            name: str_field(v, "name"),
            code: str_field(v, "code"),
            owner: str_field(v, "owner"),
            avatar_index: int_field(v, "avatarIndex"),
            members: str_list(v, "members"),
            last_message: v
                .get("lastMessage")
                .filter(|m| m.is_object())
                .map(LastMessage::from_value),
        }
    }

    /// Only the owner may broadcast. This is the sole access-control
    /// boundary on the write path.
    pub fn can_write(&self, uid: &str) -> bool {
        !uid.is_empty() && self.owner == uid
    }

    /// Membership includes the owner even though `members` does not.
    pub fn is_member(&self, uid: &str) -> bool {
        !uid.is_empty() && (self.owner == uid || self.members.iter().any(|m| m == uid))
    }
}

/// Decode an organization snapshot. Non-object entries are skipped; a
/// malformed record does not blank out the rest.
pub fn decode_organizations(docs: &[Value]) -> Vec<Organization> {
    docs.iter()
        .filter(|v| v.is_object())
        .map(Organization::from_value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn org(owner: &str, members: &[&str]) -> Organization {
        Organization {
            id: "o1".into(),
            name: "CS101".into(),
            code: "1234".into(),
            owner: owner.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_can_write_owner_only() {
        let o = org("u1", &["u2", "u3"]);
        assert!(o.can_write("u1"));
        assert!(!o.can_write("u2"));
        assert!(!o.can_write("u3"));
        assert!(!o.can_write("stranger"));
        assert!(!o.can_write(""));
    }

    #[test]
    fn test_is_member_includes_owner() {
        let o = org("u1", &["u2"]);
        assert!(o.is_member("u1"));
        assert!(o.is_member("u2"));
        assert!(!o.is_member("u3"));
        assert!(!o.is_member(""));
    }

    #[test]
    fn test_joined_member_can_read_not_write() {
        // Owner u1 creates {CS101, 1234}; u2 joins with the same name+code.
        let mut o = org("u1", &[]);
        o.members.push("u2".into());
        assert!(o.is_member("u2"));
        assert!(!o.can_write("u2"));
        assert!(o.can_write("u1"));
    }

    #[test]
    fn test_decode_defaults() {
        let o = Organization::from_value(&json!({
            "id": "abc",
            "name": 7,
            "members": ["u2", 3, "u4"],
            "avatarIndex": "2",
            "lastMessage": {"content": "hi", "senderId": "u1", "timestamp": 5, "seenBy": ["u2"]}
        }));
        assert_eq!(o.id, "abc");
        assert_eq!(o.name, "");
        assert_eq!(o.code, "");
        assert_eq!(o.owner, "");
        assert_eq!(o.avatar_index, 2);
        assert_eq!(o.members, vec!["u2".to_string(), "u4".to_string()]);
        let last = o.last_message.unwrap();
        assert_eq!(last.content, "hi");
        assert_eq!(last.seen_by, vec!["u2".to_string()]);
    }

    #[test]
    fn test_decode_organizations_one_bad_record() {
        let docs = vec![
            json!({"id": "o1", "name": "Acme", "owner": "u1"}),
            json!(null),
            json!({"id": "o2", "name": "Globex", "owner": "u2"}),
        ];
        let orgs = decode_organizations(&docs);
        assert_eq!(orgs.len(), 2);
        assert_eq!(orgs[0].name, "Acme");
        assert_eq!(orgs[1].name, "Globex");
    }
}
