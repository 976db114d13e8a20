//! Maintainer membership for a single user.
//!
//! Reconciliation only ever adds. The management API exposes no call that
//! removes a user from a maintainer, so memberships that should go are
//! reported back instead of being acted on.

use crate::error::Result;
use crate::manage::ManageClient;
use crate::types::{Maintainer, User};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

pub trait MaintainerDirectory {
    fn maintainers(&self) -> Result<Vec<Maintainer>>;
    fn maintainer_users(&self, maintainer_id: &str) -> Result<Vec<User>>;
    fn add_maintainer_user(&self, maintainer_id: &str, email: &str) -> Result<Value>;
}

impl MaintainerDirectory for ManageClient {
    fn maintainers(&self) -> Result<Vec<Maintainer>> {
        ManageClient::maintainers(self)
    }

    fn maintainer_users(&self, maintainer_id: &str) -> Result<Vec<User>> {
        ManageClient::maintainer_users(self, maintainer_id)
    }

    fn add_maintainer_user(&self, maintainer_id: &str, email: &str) -> Result<Value> {
        ManageClient::add_maintainer_user(self, maintainer_id, email)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Membership {
    pub maintainer: Maintainer,
    pub is_member: bool,
}

/// Every maintainer, flagged with whether `email` belongs to it.
pub fn membership_for(directory: &dyn MaintainerDirectory, email: &str) -> Result<Vec<Membership>> {
    directory
        .maintainers()?
        .into_iter()
        .map(|maintainer| -> Result<Membership> {
            let users = directory.maintainer_users(&maintainer.id)?;
            let is_member = users.iter().any(|u| u.email.eq_ignore_ascii_case(email));
            Ok(Membership {
                maintainer,
                is_member,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipReport {
    pub user: String,
    pub added: Vec<String>,
    pub unchanged: Vec<String>,
    /// Current memberships outside the desired set; left in place.
    pub removal_not_applied: Vec<String>,
}

/// Make `email` a member of every maintainer in `desired`.
pub fn ensure_membership(
    directory: &dyn MaintainerDirectory,
    email: &str,
    desired: &BTreeSet<String>,
) -> Result<MembershipReport> {
    let observed: BTreeSet<String> = membership_for(directory, email)?
        .into_iter()
        .filter(|m| m.is_member)
        .map(|m| m.maintainer.id)
        .collect();

    let mut report = MembershipReport {
        user: email.to_string(),
        ..MembershipReport::default()
    };

    for id in desired.difference(&observed) {
        tracing::info!(maintainer = %id, user = email, "adding to maintainer");
        directory.add_maintainer_user(id, email)?;
        report.added.push(id.clone());
    }
    report.unchanged = desired.intersection(&observed).cloned().collect();
    for id in observed.difference(desired) {
        tracing::warn!(maintainer = %id, user = email, "removal from maintainer not applied");
        report.removal_not_applied.push(id.clone());
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeDirectory {
        members: RefCell<BTreeMap<String, Vec<String>>>,
        adds: RefCell<Vec<(String, String)>>,
    }

    impl FakeDirectory {
        fn with(groups: &[(&str, &[&str])]) -> Self {
            let dir = Self::default();
            for (id, emails) in groups {
                dir.members.borrow_mut().insert(
                    id.to_string(),
                    emails.iter().map(|e| e.to_string()).collect(),
                );
            }
            dir
        }
    }

    impl MaintainerDirectory for FakeDirectory {
        fn maintainers(&self) -> Result<Vec<Maintainer>> {
            Ok(self
                .members
                .borrow()
                .keys()
                .map(|id| Maintainer {
                    id: id.clone(),
                    name: format!("maintainer {id}"),
                })
                .collect())
        }

        fn maintainer_users(&self, maintainer_id: &str) -> Result<Vec<User>> {
            Ok(self.members.borrow()[maintainer_id]
                .iter()
                .map(|e| User {
                    id: "1".into(),
                    email: e.clone(),
                    name: String::new(),
                })
                .collect())
        }

        fn add_maintainer_user(&self, maintainer_id: &str, email: &str) -> Result<Value> {
            self.adds
                .borrow_mut()
                .push((maintainer_id.to_string(), email.to_string()));
            Ok(json!({}))
        }
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn membership_view_flags_user() {
        let dir = FakeDirectory::with(&[("1", &["a@x.io"]), ("2", &["b@x.io"])]);
        let view = membership_for(&dir, "A@x.io").unwrap();
        assert!(view[0].is_member);
        assert!(!view[1].is_member);
    }

    #[test]
    fn only_missing_memberships_are_added() {
        let dir = FakeDirectory::with(&[
            ("1", &["a@x.io"]),
            ("2", &["a@x.io"]),
            ("3", &[]),
            ("4", &["b@x.io"]),
        ]);
        let report = ensure_membership(&dir, "a@x.io", &ids(&["2", "3", "4"])).unwrap();

        assert_eq!(report.added, vec!["3", "4"]);
        assert_eq!(report.unchanged, vec!["2"]);
        assert_eq!(report.removal_not_applied, vec!["1"]);
        let adds = dir.adds.borrow();
        assert_eq!(adds.len(), 2);
        assert!(adds.iter().all(|(_, email)| email == "a@x.io"));
    }

    #[test]
    fn already_reconciled_issues_no_calls() {
        let dir = FakeDirectory::with(&[("1", &["a@x.io"]), ("2", &[])]);
        let report = ensure_membership(&dir, "a@x.io", &ids(&["1"])).unwrap();
        assert!(report.added.is_empty());
        assert!(report.removal_not_applied.is_empty());
        assert!(dir.adds.borrow().is_empty());
    }

    #[test]
    fn empty_desired_set_removes_nothing() {
        let dir = FakeDirectory::with(&[("1", &["a@x.io"]), ("2", &["a@x.io"])]);
        let report = ensure_membership(&dir, "a@x.io", &BTreeSet::new()).unwrap();
        assert_eq!(report.removal_not_applied, vec!["1", "2"]);
        assert!(dir.adds.borrow().is_empty());
    }
}
