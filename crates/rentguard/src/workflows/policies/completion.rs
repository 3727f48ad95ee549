use serde::Serialize;

use super::domain::{Actor, ActorId, ActorRole, GuarantorType};
use super::requirements::{required_roles, Cardinality};

/// A required role whose active actor count does not satisfy its cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleShortfall {
    pub role: ActorRole,
    pub expected: Cardinality,
    pub found: usize,
}

impl RoleShortfall {
    pub fn describe(&self) -> String {
        match (self.expected, self.found) {
            (_, 0) => format!("no {} has been added", self.role.label()),
            (Cardinality::ExactlyOne, found) => {
                format!("expected one {} but found {found}", self.role.label())
            }
            (Cardinality::AtLeastOne, _) => format!("no {} has been added", self.role.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteActor {
    pub role: ActorRole,
    pub actor_id: ActorId,
    pub name: String,
}

/// Outcome of the actor completion predicate, naming whatever blocks it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub shortfalls: Vec<RoleShortfall>,
    pub incomplete: Vec<IncompleteActor>,
}

impl CompletionReport {
    pub fn is_complete(&self) -> bool {
        self.shortfalls.is_empty() && self.incomplete.is_empty()
    }

    /// Roles that block completion, deduplicated in role order.
    pub fn blocking_roles(&self) -> Vec<ActorRole> {
        let mut roles: Vec<ActorRole> = self
            .shortfalls
            .iter()
            .map(|shortfall| shortfall.role)
            .chain(self.incomplete.iter().map(|actor| actor.role))
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    pub fn summary(&self) -> String {
        if self.is_complete() {
            return "all actors have completed their information".to_string();
        }

        let mut parts: Vec<String> = self.shortfalls.iter().map(RoleShortfall::describe).collect();
        parts.extend(self.incomplete.iter().map(|actor| {
            format!(
                "{} {} has not completed their information",
                actor.role.label(),
                actor.name
            )
        }));
        parts.join("; ")
    }
}

/// Evaluate whether every required actor is present and every active actor,
/// required or not, has marked their information complete.
pub fn evaluate(guarantor_type: GuarantorType, actors: &[Actor]) -> CompletionReport {
    let active: Vec<&Actor> = actors.iter().filter(|actor| actor.is_active()).collect();

    let shortfalls = required_roles(guarantor_type)
        .iter()
        .filter_map(|requirement| {
            let found = active
                .iter()
                .filter(|actor| actor.role == requirement.role)
                .count();
            (!requirement.cardinality.admits(found)).then_some(RoleShortfall {
                role: requirement.role,
                expected: requirement.cardinality,
                found,
            })
        })
        .collect();

    let mut incomplete: Vec<IncompleteActor> = active
        .iter()
        .filter(|actor| !actor.information_complete)
        .map(|actor| IncompleteActor {
            role: actor.role,
            actor_id: actor.id.clone(),
            name: actor.display_name(),
        })
        .collect();
    incomplete.sort_by_key(|actor| actor.role);

    CompletionReport {
        shortfalls,
        incomplete,
    }
}
