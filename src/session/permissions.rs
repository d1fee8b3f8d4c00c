//! Permission resolution
//!
//! The check walks the node's ancestor chain from the node itself up to
//! the root. The first ACL on the walk that yields a decision for the
//! principal settles the question ("closest ACL wins"): a deny at the
//! root with a grant on the child grants, a grant at the root with a
//! deny on the child denies. A walk that finds no decision at all
//! grants: the repository is open until someone attaches an ACL.
//!
//! Administrators and the system principal bypass the walk entirely.

use crate::node::{NodeState, Permission};

/// First decision found along the chain, node first, root last
pub fn decide_along_chain<'a>(
    principal: &str,
    requested: Permission,
    chain: impl IntoIterator<Item = &'a NodeState>,
) -> Option<bool> {
    for state in chain {
        if let Some(acl) = state.acl() {
            if let Some(decision) = acl.decide(principal, requested) {
                return Some(decision);
            }
        }
    }
    None
}

/// Resolve the chain's decision into the final answer
pub fn granted_along_chain<'a>(
    principal: &str,
    requested: Permission,
    chain: impl IntoIterator<Item = &'a NodeState>,
) -> bool {
    decide_along_chain(principal, requested, chain).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Ace, Acl, NodeId, Permission};

    fn node_with_acl(parent: Option<NodeId>, acl: Option<Acl>) -> NodeState {
        let mut state = NodeState::new(NodeId::new(), parent, "n", "Folder", "project");
        state.set_acl(acl);
        state
    }

    #[test]
    fn test_deny_at_root_grant_at_child_grants() {
        let root = node_with_acl(
            None,
            Some(Acl::from_entries(vec![Ace::deny("bob", Permission::Read)])),
        );
        let child = node_with_acl(
            Some(root.id()),
            Some(Acl::from_entries(vec![Ace::grant("bob", Permission::Read)])),
        );

        assert!(granted_along_chain("bob", Permission::Read, [&child, &root]));
    }

    #[test]
    fn test_grant_at_root_deny_at_child_denies() {
        let root = node_with_acl(
            None,
            Some(Acl::from_entries(vec![Ace::grant("bob", Permission::Read)])),
        );
        let child = node_with_acl(
            Some(root.id()),
            Some(Acl::from_entries(vec![Ace::deny("bob", Permission::Read)])),
        );

        assert!(!granted_along_chain("bob", Permission::Read, [&child, &root]));
    }

    #[test]
    fn test_three_level_middle_decision_wins() {
        let root = node_with_acl(
            None,
            Some(Acl::from_entries(vec![Ace::grant("bob", Permission::Read)])),
        );
        let middle = node_with_acl(
            Some(root.id()),
            Some(Acl::from_entries(vec![Ace::deny("bob", Permission::Read)])),
        );
        // No ACL on the leaf: the middle deny decides
        let leaf = node_with_acl(Some(middle.id()), None);

        assert!(!granted_along_chain(
            "bob",
            Permission::Read,
            [&leaf, &middle, &root]
        ));
    }

    #[test]
    fn test_no_decision_anywhere_grants() {
        let root = node_with_acl(None, None);
        let child = node_with_acl(Some(root.id()), None);
        assert!(granted_along_chain("bob", Permission::Read, [&child, &root]));
    }

    #[test]
    fn test_unrelated_acl_yields_no_decision() {
        let root = node_with_acl(
            None,
            Some(Acl::from_entries(vec![Ace::deny("alice", Permission::Read)])),
        );
        assert_eq!(decide_along_chain("bob", Permission::Read, [&root]), None);
        assert!(granted_along_chain("bob", Permission::Read, [&root]));
    }
}
