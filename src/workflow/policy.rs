//! Who may run which action

use crate::core::community::Community;
use crate::core::identity::Identity;
use crate::entities::record::Record;
use crate::entities::request::{Request, RequestType};
use crate::workflow::actions::RequestAction;

/// Resolved aggregates an authorization decision may look at
#[derive(Debug, Clone, Copy)]
pub struct PolicySubject<'a> {
    pub request_type: &'a RequestType,
    pub request: &'a Request,
    pub topic: &'a Record,
    pub receiver: &'a Community,
}

/// Authorization collaborator consulted before any handler runs
pub trait AuthorizationPolicy: Send + Sync {
    fn can_execute(
        &self,
        identity: &Identity,
        action: RequestAction,
        subject: &PolicySubject<'_>,
    ) -> bool;
}

/// Default policy based on request ownership and community roles
///
/// - the system identity may run every action
/// - `create` needs the record owner acting as the request creator
/// - `submit`, `cancel` and `delete` belong to the creator
/// - `accept` and `decline` need a curator role in the receiving community
/// - `expire` is reserved to the system
#[derive(Debug, Default, Clone, Copy)]
pub struct CommunityRolePolicy;

impl AuthorizationPolicy for CommunityRolePolicy {
    fn can_execute(
        &self,
        identity: &Identity,
        action: RequestAction,
        subject: &PolicySubject<'_>,
    ) -> bool {
        let user = match identity {
            Identity::System => return true,
            Identity::User(id) => id,
        };

        match action {
            RequestAction::Create => {
                &subject.topic.owner == user && subject.request.creator_id() == user
            }
            RequestAction::Submit | RequestAction::Cancel | RequestAction::Delete => {
                subject.request.creator_id() == user
            }
            RequestAction::Accept | RequestAction::Decline => subject
                .receiver
                .has_role(user, subject.request_type.curator_roles),
            RequestAction::Expire => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::community::CommunityRole;
    use crate::core::identity::{EntityId, EntityPrefix, EntityRef};
    use crate::entities::metadata::Metadata;
    use crate::entities::request::COMMUNITY_SUBMISSION;

    struct Fixture {
        owner: EntityId,
        curator: EntityId,
        reader: EntityId,
        record: Record,
        community: Community,
        request: Request,
    }

    fn fixture() -> Fixture {
        let owner = EntityId::new(EntityPrefix::Usr);
        let curator = EntityId::new(EntityPrefix::Usr);
        let reader = EntityId::new(EntityPrefix::Usr);
        let record = Record::new_draft(owner, Metadata::new("Dataset A"));
        let community = Community::new("hydro", "Hydrology")
            .with_member(curator, None, CommunityRole::Curator)
            .with_member(reader, None, CommunityRole::Reader);
        let request = Request::new(
            &COMMUNITY_SUBMISSION,
            EntityRef::User(owner),
            EntityRef::Community(community.id),
            EntityRef::Record(record.id),
        );
        Fixture {
            owner,
            curator,
            reader,
            record,
            community,
            request,
        }
    }

    fn allowed(f: &Fixture, identity: Identity, action: RequestAction) -> bool {
        let subject = PolicySubject {
            request_type: &COMMUNITY_SUBMISSION,
            request: &f.request,
            topic: &f.record,
            receiver: &f.community,
        };
        CommunityRolePolicy.can_execute(&identity, action, &subject)
    }

    #[test]
    fn test_creator_actions() {
        let f = fixture();
        for action in [
            RequestAction::Create,
            RequestAction::Submit,
            RequestAction::Cancel,
            RequestAction::Delete,
        ] {
            assert!(allowed(&f, Identity::User(f.owner), action), "{action}");
            assert!(!allowed(&f, Identity::User(f.curator), action), "{action}");
        }
    }

    #[test]
    fn test_curator_actions() {
        let f = fixture();
        for action in [RequestAction::Accept, RequestAction::Decline] {
            assert!(allowed(&f, Identity::User(f.curator), action));
            assert!(!allowed(&f, Identity::User(f.reader), action));
            assert!(!allowed(&f, Identity::User(f.owner), action));
        }
    }

    #[test]
    fn test_expire_is_system_only() {
        let f = fixture();
        assert!(allowed(&f, Identity::System, RequestAction::Expire));
        assert!(!allowed(&f, Identity::User(f.curator), RequestAction::Expire));
        assert!(!allowed(&f, Identity::User(f.owner), RequestAction::Expire));
    }
}
