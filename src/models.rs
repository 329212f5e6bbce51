use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{LibError, Result};

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 150;
pub const DESCRIPTION_MAX_LEN: usize = 500;
pub const DOMAIN_MAX_LEN: usize = 100;
pub const SSO_ID_MAX_LEN: usize = 100;

/// Modern group identifier, assigned by the upstream producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct GroupId(pub Uuid);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

impl From<Uuid> for GroupId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Legacy numeric group identifier, generated by the authorization store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegacyGroupId(pub i64);

impl fmt::Display for LegacyGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Legacy numeric member identifier (a user id, or another group's legacy id
/// for nested memberships).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegacyMemberId(pub i64);

impl fmt::Display for LegacyMemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipType {
    User,
    Group,
}

impl MembershipType {
    /// Numeric encoding used by the `group_membership` table.
    pub const fn as_db_value(self) -> i32 {
        match self {
            MembershipType::User => 1,
            MembershipType::Group => 2,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(MembershipType::User),
            "group" => Some(MembershipType::Group),
            _ => None,
        }
    }
}

/// The operations this worker replicates, one per subscribed topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CreateGroup,
    UpdateGroup,
    DeleteGroup,
    AddMember,
    RemoveMember,
}

/// Broker message envelope. The payload shape depends on the topic and is
/// parsed separately by [`GroupEvent::from_message`].
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub topic: String,
    pub originator: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "mime-type")]
    pub mime_type: String,
    pub payload: Value,
}

impl EventMessage {
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        let message: EventMessage = serde_json::from_slice(raw).map_err(|err| {
            LibError::invalid_with_code(
                "invalid_message_json",
                "Event message is not valid JSON for the expected envelope",
                anyhow!(err),
            )
        })?;
        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(LibError::invalid(
                "Envelope topic is required",
                anyhow!("empty envelope topic"),
            ));
        }
        if self.originator.trim().is_empty() {
            return Err(LibError::invalid(
                "Envelope originator is required",
                anyhow!("empty envelope originator"),
            ));
        }
        if self.mime_type.trim().is_empty() {
            return Err(LibError::invalid(
                "Envelope mime-type is required",
                anyhow!("empty envelope mime-type"),
            ));
        }
        Ok(())
    }
}

/// Validated, normalized event — the tagged union the handlers consume.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    Create(NewGroup),
    Update(GroupUpdate),
    Delete(GroupDeletion),
    AddMember(NewMembership),
    RemoveMember(MembershipRemoval),
}

impl GroupEvent {
    /// Parse and normalize the payload for the operation arriving on `kind`'s
    /// topic. Fails without side effects on any shape or constraint violation.
    pub fn from_message(kind: EventKind, message: &EventMessage) -> Result<Self> {
        match kind {
            EventKind::CreateGroup => {
                let payload: CreateGroupPayload = parse_payload(&message.payload)?;
                Ok(GroupEvent::Create(payload.normalize(message.timestamp)?))
            }
            EventKind::UpdateGroup => {
                let payload: UpdateGroupPayload = parse_payload(&message.payload)?;
                Ok(GroupEvent::Update(payload.normalize(message.timestamp)?))
            }
            EventKind::DeleteGroup => {
                let payload: DeleteGroupsPayload = parse_payload(&message.payload)?;
                Ok(GroupEvent::Delete(payload.normalize()?))
            }
            EventKind::AddMember => {
                let payload: AddMemberPayload = parse_payload(&message.payload)?;
                Ok(GroupEvent::AddMember(payload.normalize(message.timestamp)?))
            }
            EventKind::RemoveMember => {
                let payload: RemoveMemberPayload = parse_payload(&message.payload)?;
                Ok(GroupEvent::RemoveMember(payload.normalize()?))
            }
        }
    }
}

fn parse_payload<T: DeserializeOwned>(payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone()).map_err(|err| {
        LibError::invalid_with_code(
            "invalid_payload",
            "Event payload failed validation",
            anyhow!(err),
        )
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupPayload {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub private_group: bool,
    pub self_register: bool,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub sso_id: Option<String>,
    pub organization_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupPayload {
    pub id: String,
    pub name: String,
    pub old_name: String,
    pub old_id: i64,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub private_group: bool,
    pub self_register: bool,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub sso_id: Option<String>,
    pub organization_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteGroupsPayload {
    pub groups: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberPayload {
    pub id: Option<String>,
    pub group_id: Option<String>,
    pub name: String,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub member_id: Option<String>,
    #[serde(rename = "universalUID")]
    pub universal_uid: Option<String>,
    pub old_id: String,
    pub member_old_id: Option<String>,
    pub membership_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberPayload {
    pub group_id: String,
    pub name: String,
    pub old_id: String,
    pub member_id: String,
}

/// Normalized create-group record.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub private_group: bool,
    pub self_register: bool,
    pub created_by: Option<String>,
    pub audit_at: NaiveDateTime,
}

/// Normalized update-group record, targeting the row by legacy id.
#[derive(Debug, Clone)]
pub struct GroupUpdate {
    pub id: GroupId,
    pub legacy_id: LegacyGroupId,
    pub name: String,
    pub old_name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub private_group: bool,
    pub self_register: bool,
    pub updated_by: Option<String>,
    pub audit_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct GroupDeletion {
    pub groups: Vec<LegacyGroupId>,
}

/// The member half of an add-member event. External references are resolved
/// to a legacy id through the profile service at handling time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRef {
    Legacy(LegacyMemberId),
    External(String),
}

#[derive(Debug, Clone)]
pub struct NewMembership {
    pub group: LegacyGroupId,
    pub group_name: String,
    pub membership_type: MembershipType,
    pub member: MemberRef,
    pub created_by: Option<String>,
    pub audit_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct MembershipRemoval {
    pub group_id: GroupId,
    pub group: LegacyGroupId,
    pub group_name: String,
    pub member: LegacyMemberId,
}

impl CreateGroupPayload {
    pub fn normalize(self, received_at: DateTime<Utc>) -> Result<NewGroup> {
        let id = parse_group_uuid(&self.id)?;
        let name = validate_name(&self.name)?;
        let description = validate_description(self.description)?;
        let domain = validate_domain(self.domain)?;
        validate_sso_id(self.sso_id.as_deref())?;

        Ok(NewGroup {
            id,
            name,
            description,
            domain,
            private_group: self.private_group,
            self_register: self.self_register,
            created_by: self.created_by,
            audit_at: self.created_at.unwrap_or(received_at).naive_utc(),
        })
    }
}

impl UpdateGroupPayload {
    pub fn normalize(self, received_at: DateTime<Utc>) -> Result<GroupUpdate> {
        let id = parse_group_uuid(&self.id)?;
        let name = validate_name(&self.name)?;
        let old_name = validate_name(&self.old_name)?;
        let description = validate_description(self.description)?;
        let domain = validate_domain(self.domain)?;
        validate_sso_id(self.sso_id.as_deref())?;

        Ok(GroupUpdate {
            id,
            legacy_id: LegacyGroupId(self.old_id),
            name,
            old_name,
            description,
            domain,
            private_group: self.private_group,
            self_register: self.self_register,
            updated_by: self.updated_by,
            audit_at: self.updated_at.unwrap_or(received_at).naive_utc(),
        })
    }
}

impl DeleteGroupsPayload {
    pub fn normalize(self) -> Result<GroupDeletion> {
        if self.groups.is_empty() {
            return Err(LibError::invalid(
                "At least one group is required",
                anyhow!("delete payload had an empty groups array"),
            ));
        }

        let mut groups = Vec::with_capacity(self.groups.len());
        for entry in &self.groups {
            groups.push(delete_entry_legacy_id(entry)?);
        }
        Ok(GroupDeletion { groups })
    }
}

impl AddMemberPayload {
    pub fn normalize(self, received_at: DateTime<Utc>) -> Result<NewMembership> {
        let group_name = validate_name(&self.name)?;
        let group = parse_group_legacy_id(&self.old_id)?;
        let membership_type = MembershipType::parse(&self.membership_type).ok_or_else(|| {
            LibError::invalid_with_code(
                "membership_type_invalid",
                "membershipType must be \"user\" or \"group\"",
                anyhow!("unknown membership type {:?}", self.membership_type),
            )
        })?;

        // An external profile reference takes precedence over inline ids; it
        // is resolved against the profile service when the event is handled.
        let member = match self.universal_uid.filter(|uid| !uid.trim().is_empty()) {
            Some(uid) => MemberRef::External(uid),
            None => match membership_type {
                MembershipType::Group => {
                    let raw = self.member_old_id.ok_or_else(|| {
                        LibError::invalid(
                            "memberOldId is required for group memberships",
                            anyhow!("missing memberOldId"),
                        )
                    })?;
                    MemberRef::Legacy(parse_member_legacy_id(&raw)?)
                }
                MembershipType::User => {
                    let raw = self.member_id.ok_or_else(|| {
                        LibError::invalid(
                            "memberId is required for user memberships",
                            anyhow!("missing memberId"),
                        )
                    })?;
                    MemberRef::Legacy(parse_member_legacy_id(&raw)?)
                }
            },
        };

        Ok(NewMembership {
            group,
            group_name,
            membership_type,
            member,
            created_by: self.created_by,
            audit_at: self.created_at.unwrap_or(received_at).naive_utc(),
        })
    }
}

impl RemoveMemberPayload {
    pub fn normalize(self) -> Result<MembershipRemoval> {
        let group_id = parse_group_uuid(&self.group_id)?;
        let group_name = validate_name(&self.name)?;
        let group = parse_group_legacy_id(&self.old_id)?;
        let member = parse_member_legacy_id(&self.member_id)?;

        Ok(MembershipRemoval {
            group_id,
            group,
            group_name,
            member,
        })
    }
}

fn parse_group_uuid(raw: &str) -> Result<GroupId> {
    raw.parse().map_err(|err| {
        LibError::invalid_with_code(
            "id_not_uuid",
            "Group id must be a valid UUID",
            anyhow!("invalid uuid {:?}: {}", raw, err),
        )
    })
}

fn validate_name(name: &str) -> Result<String> {
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(LibError::invalid_with_code(
            "name_length",
            "Group name must be between 2 and 150 characters",
            anyhow!(
                "name length {} outside {}..={}",
                len,
                NAME_MIN_LEN,
                NAME_MAX_LEN
            ),
        ));
    }
    Ok(name.to_string())
}

fn validate_description(description: Option<String>) -> Result<Option<String>> {
    if let Some(value) = &description {
        let len = value.chars().count();
        if len > DESCRIPTION_MAX_LEN {
            return Err(LibError::invalid_with_code(
                "description_length",
                "Group description must be at most 500 characters",
                anyhow!("description length {} exceeds {}", len, DESCRIPTION_MAX_LEN),
            ));
        }
    }
    Ok(description)
}

fn validate_domain(domain: Option<String>) -> Result<Option<String>> {
    if let Some(value) = &domain {
        let len = value.chars().count();
        if len > DOMAIN_MAX_LEN {
            return Err(LibError::invalid_with_code(
                "domain_length",
                "Group domain must be at most 100 characters",
                anyhow!("domain length {} exceeds {}", len, DOMAIN_MAX_LEN),
            ));
        }
    }
    Ok(domain)
}

fn validate_sso_id(sso_id: Option<&str>) -> Result<()> {
    if let Some(value) = sso_id {
        let len = value.chars().count();
        if len > SSO_ID_MAX_LEN {
            return Err(LibError::invalid_with_code(
                "sso_id_length",
                "Group ssoId must be at most 100 characters",
                anyhow!("ssoId length {} exceeds {}", len, SSO_ID_MAX_LEN),
            ));
        }
    }
    Ok(())
}

fn parse_group_legacy_id(raw: &str) -> Result<LegacyGroupId> {
    raw.parse::<i64>().map(LegacyGroupId).map_err(|err| {
        LibError::invalid_with_code(
            "legacy_id_invalid",
            "Group oldId must be numeric",
            anyhow!("invalid oldId {:?}: {}", raw, err),
        )
    })
}

fn parse_member_legacy_id(raw: &str) -> Result<LegacyMemberId> {
    raw.parse::<i64>().map(LegacyMemberId).map_err(|err| {
        LibError::invalid_with_code(
            "member_id_invalid",
            "Member id must be numeric",
            anyhow!("invalid member id {:?}: {}", raw, err),
        )
    })
}

/// Delete payload entries are duck-typed upstream: a bare id, a numeric
/// string, or an object carrying `oldId`.
fn delete_entry_legacy_id(entry: &Value) -> Result<LegacyGroupId> {
    let id = match entry {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        Value::Object(fields) => fields.get("oldId").and_then(|old_id| match old_id {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }),
        _ => None,
    };

    id.map(LegacyGroupId).ok_or_else(|| {
        LibError::invalid_with_code(
            "legacy_id_invalid",
            "Each deleted group must carry a numeric oldId",
            anyhow!("unusable delete entry {}", entry),
        )
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    fn received_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 4, 7, 12, 30, 0).unwrap()
    }

    fn create_payload() -> Value {
        json!({
            "id": "55ba651a-dbb5-4d72-9dc4-2ff29e7cb1f7",
            "name": "group-1",
            "description": "desc-1",
            "domain": "www.topcoder.com",
            "privateGroup": true,
            "selfRegister": true,
            "createdBy": "8547899"
        })
    }

    #[test]
    fn create_payload_normalizes() {
        let payload: CreateGroupPayload = serde_json::from_value(create_payload()).unwrap();
        let group = payload.normalize(received_at()).expect("should normalize");

        assert_eq!(group.name, "group-1");
        assert_eq!(group.description.as_deref(), Some("desc-1"));
        assert_eq!(group.domain.as_deref(), Some("www.topcoder.com"));
        assert!(group.private_group);
        assert!(group.self_register);
        assert_eq!(group.created_by.as_deref(), Some("8547899"));
        assert_eq!(group.audit_at, received_at().naive_utc());
    }

    #[test]
    fn create_payload_rejects_short_name() {
        let mut raw = create_payload();
        raw["name"] = json!("g");
        let payload: CreateGroupPayload = serde_json::from_value(raw).unwrap();

        let err = payload
            .normalize(received_at())
            .expect_err("single-char name should fail");
        assert_eq!(err.code, "name_length");
        assert_eq!(err.public, "Group name must be between 2 and 150 characters");
    }

    #[test]
    fn create_payload_rejects_overlong_description() {
        let mut raw = create_payload();
        raw["description"] = json!("d".repeat(DESCRIPTION_MAX_LEN + 1));
        let payload: CreateGroupPayload = serde_json::from_value(raw).unwrap();

        let err = payload
            .normalize(received_at())
            .expect_err("oversized description should fail");
        assert_eq!(err.code, "description_length");
    }

    #[test]
    fn create_payload_rejects_bad_uuid() {
        let mut raw = create_payload();
        raw["id"] = json!("not-a-uuid");
        let payload: CreateGroupPayload = serde_json::from_value(raw).unwrap();

        let err = payload
            .normalize(received_at())
            .expect_err("invalid uuid should fail");
        assert_eq!(err.code, "id_not_uuid");
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn create_payload_keeps_audit_user_as_given() {
        let mut raw = create_payload();
        raw["createdBy"] = json!("admin");
        let payload: CreateGroupPayload = serde_json::from_value(raw).unwrap();

        let group = payload
            .normalize(received_at())
            .expect("createdBy is an opaque string");
        assert_eq!(group.created_by.as_deref(), Some("admin"));
    }

    #[test]
    fn create_payload_requires_boolean_flags() {
        let mut raw = create_payload();
        raw["privateGroup"] = json!("yes");

        let err = serde_json::from_value::<CreateGroupPayload>(raw)
            .expect_err("non-boolean privateGroup should fail to parse");
        assert!(err.to_string().contains("boolean"), "got: {err}");
    }

    #[test]
    fn create_payload_reports_missing_required_field() {
        let mut raw = create_payload();
        raw.as_object_mut().unwrap().remove("name");

        let err = serde_json::from_value::<CreateGroupPayload>(raw)
            .expect_err("missing name should fail to parse");
        assert!(err.to_string().contains("name"), "got: {err}");
    }

    #[test]
    fn update_payload_normalizes_with_null_filled_optionals() {
        let payload: UpdateGroupPayload = serde_json::from_value(json!({
            "id": "55ba651a-dbb5-4d72-9dc4-2ff29e7cb1f7",
            "name": "group-renamed",
            "oldName": "group-1",
            "oldId": 10500,
            "privateGroup": false,
            "selfRegister": true,
            "updatedBy": "132456"
        }))
        .unwrap();

        let update = payload.normalize(received_at()).expect("should normalize");
        assert_eq!(update.legacy_id, LegacyGroupId(10500));
        assert_eq!(update.old_name, "group-1");
        assert_eq!(update.description, None);
        assert_eq!(update.domain, None);
        assert_eq!(update.updated_by.as_deref(), Some("132456"));
        assert_eq!(update.audit_at, received_at().naive_utc());
    }

    #[test]
    fn update_payload_prefers_payload_timestamp() {
        let payload: UpdateGroupPayload = serde_json::from_value(json!({
            "id": "55ba651a-dbb5-4d72-9dc4-2ff29e7cb1f7",
            "name": "group-renamed",
            "oldName": "group-1",
            "oldId": 10500,
            "privateGroup": false,
            "selfRegister": true,
            "updatedAt": "2020-05-01T08:00:00Z"
        }))
        .unwrap();

        let update = payload.normalize(received_at()).expect("should normalize");
        assert_eq!(
            update.audit_at,
            Utc.with_ymd_and_hms(2020, 5, 1, 8, 0, 0).unwrap().naive_utc()
        );
    }

    #[test]
    fn delete_payload_accepts_mixed_entry_shapes() {
        let payload: DeleteGroupsPayload = serde_json::from_value(json!({
            "groups": [10500, "10501", {"id": "55ba651a-dbb5-4d72-9dc4-2ff29e7cb1f7", "oldId": "10502"}]
        }))
        .unwrap();

        let deletion = payload.normalize().expect("should normalize");
        assert_eq!(
            deletion.groups,
            vec![
                LegacyGroupId(10500),
                LegacyGroupId(10501),
                LegacyGroupId(10502)
            ]
        );
    }

    #[test]
    fn delete_payload_rejects_empty_array() {
        let payload: DeleteGroupsPayload =
            serde_json::from_value(json!({ "groups": [] })).unwrap();

        let err = payload.normalize().expect_err("empty groups should fail");
        assert_eq!(err.public, "At least one group is required");
    }

    #[test]
    fn delete_payload_rejects_unusable_entry() {
        let payload: DeleteGroupsPayload =
            serde_json::from_value(json!({ "groups": [{"name": "no-id"}] })).unwrap();

        let err = payload.normalize().expect_err("entry without oldId should fail");
        assert_eq!(err.code, "legacy_id_invalid");
    }

    #[test]
    fn add_member_resolves_external_profile_reference_first() {
        let payload: AddMemberPayload = serde_json::from_value(json!({
            "name": "group-1",
            "oldId": "10500",
            "membershipType": "user",
            "memberId": "999",
            "universalUID": "3be33f96-07f6-4b3b-b486-c75ac8c37e68"
        }))
        .unwrap();

        let membership = payload.normalize(received_at()).expect("should normalize");
        assert_eq!(
            membership.member,
            MemberRef::External("3be33f96-07f6-4b3b-b486-c75ac8c37e68".to_string())
        );
    }

    #[test]
    fn add_member_uses_member_old_id_for_nested_groups() {
        let payload: AddMemberPayload = serde_json::from_value(json!({
            "name": "group-1",
            "oldId": "10500",
            "membershipType": "group",
            "memberOldId": "10042"
        }))
        .unwrap();

        let membership = payload.normalize(received_at()).expect("should normalize");
        assert_eq!(membership.membership_type, MembershipType::Group);
        assert_eq!(membership.member, MemberRef::Legacy(LegacyMemberId(10042)));
    }

    #[test]
    fn add_member_requires_member_id_for_users() {
        let payload: AddMemberPayload = serde_json::from_value(json!({
            "name": "group-1",
            "oldId": "10500",
            "membershipType": "user"
        }))
        .unwrap();

        let err = payload
            .normalize(received_at())
            .expect_err("missing memberId should fail");
        assert_eq!(err.public, "memberId is required for user memberships");
    }

    #[test]
    fn add_member_rejects_unknown_membership_type() {
        let payload: AddMemberPayload = serde_json::from_value(json!({
            "name": "group-1",
            "oldId": "10500",
            "membershipType": "owner",
            "memberId": "999"
        }))
        .unwrap();

        let err = payload
            .normalize(received_at())
            .expect_err("unknown membershipType should fail");
        assert_eq!(err.code, "membership_type_invalid");
    }

    #[test]
    fn remove_member_normalizes() {
        let payload: RemoveMemberPayload = serde_json::from_value(json!({
            "groupId": "55ba651a-dbb5-4d72-9dc4-2ff29e7cb1f7",
            "name": "group-1",
            "oldId": "10500",
            "memberId": "999"
        }))
        .unwrap();

        let removal = payload.normalize().expect("should normalize");
        assert_eq!(removal.group, LegacyGroupId(10500));
        assert_eq!(removal.member, LegacyMemberId(999));
    }

    #[test]
    fn membership_type_db_encoding() {
        assert_eq!(MembershipType::User.as_db_value(), 1);
        assert_eq!(MembershipType::Group.as_db_value(), 2);
        assert_eq!(MembershipType::parse("group"), Some(MembershipType::Group));
        assert_eq!(MembershipType::parse("owner"), None);
    }

    #[test]
    fn envelope_parses_with_mime_type_key() {
        let raw = json!({
            "topic": "groups.notification.create",
            "originator": "groups-api",
            "timestamp": "2020-04-07T12:30:00Z",
            "mime-type": "application/json",
            "payload": create_payload()
        });

        let message = EventMessage::from_slice(raw.to_string().as_bytes())
            .expect("envelope should parse");
        assert_eq!(message.topic, "groups.notification.create");
        assert_eq!(message.mime_type, "application/json");
    }

    #[test]
    fn envelope_rejects_invalid_json() {
        let err = EventMessage::from_slice(b"{ not json")
            .expect_err("malformed JSON should fail");
        assert_eq!(err.code, "invalid_message_json");
    }

    #[test]
    fn envelope_rejects_blank_originator() {
        let raw = json!({
            "topic": "groups.notification.create",
            "originator": "",
            "timestamp": "2020-04-07T12:30:00Z",
            "mime-type": "application/json",
            "payload": {}
        });

        let err = EventMessage::from_slice(raw.to_string().as_bytes())
            .expect_err("blank originator should fail");
        assert_eq!(err.public, "Envelope originator is required");
    }
}
