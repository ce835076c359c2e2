//! Keyed comparison of approver lists.

use std::collections::BTreeMap;

use crate::models::gate::Approver;

/// Partition of approver records that differ between two versions of a gate,
/// keyed by user-id.
#[derive(Debug, Default, PartialEq)]
pub struct ApproverDiff<'a> {
    /// Present now, absent before.
    pub added: Vec<&'a Approver>,
    /// Present in both, but (decision, timestamp) differ. Holds the new record.
    pub changed: Vec<&'a Approver>,
    /// Present before, absent now.
    pub removed: Vec<&'a Approver>,
}

impl<'a> ApproverDiff<'a> {
    pub fn compute(new: &'a [Approver], old: &'a [Approver]) -> Self {
        let old_by_user: BTreeMap<&str, &Approver> =
            old.iter().map(|a| (a.user_id.as_str(), a)).collect();
        let new_by_user: BTreeMap<&str, &Approver> =
            new.iter().map(|a| (a.user_id.as_str(), a)).collect();

        let mut diff = ApproverDiff::default();
        for approver in new {
            match old_by_user.get(approver.user_id.as_str()) {
                None => diff.added.push(approver),
                Some(prior) if *prior != approver => diff.changed.push(approver),
                Some(_) => {}
            }
        }
        for approver in old {
            if !new_by_user.contains_key(approver.user_id.as_str()) {
                diff.removed.push(approver);
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Every user-id touched by the write, in added/changed/removed order.
    pub fn user_ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.added
            .iter()
            .chain(self.changed.iter())
            .chain(self.removed.iter())
            .map(|a| a.user_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gate::Decision;
    use chrono::{TimeZone, Utc};

    fn approver(user: &str, decision: Decision) -> Approver {
        Approver::new(user, decision)
    }

    #[test]
    fn test_identical_lists_have_no_diff() {
        let list = vec![approver("alice", Decision::Approved)];
        assert!(ApproverDiff::compute(&list, &list.clone()).is_empty());
    }

    #[test]
    fn test_reordering_is_not_a_change() {
        let old = vec![approver("alice", Decision::Approved), approver("bob", Decision::Approved)];
        let new = vec![approver("bob", Decision::Approved), approver("alice", Decision::Approved)];
        assert!(ApproverDiff::compute(&new, &old).is_empty());
    }

    #[test]
    fn test_partitions_added_changed_removed() {
        let old = vec![
            approver("alice", Decision::Approved),
            approver("bob", Decision::Approved),
        ];
        let new = vec![
            approver("alice", Decision::Rejected),
            approver("carol", Decision::Approved),
        ];
        let diff = ApproverDiff::compute(&new, &old);

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].user_id, "carol");
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].decision, Decision::Rejected);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].user_id, "bob");
        assert_eq!(diff.user_ids().collect::<Vec<_>>(), vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_timestamp_change_counts_as_changed() {
        let old = vec![approver("alice", Decision::Approved)];
        let mut stamped = approver("alice", Decision::Approved);
        stamped.approved_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let new = vec![stamped];

        let diff = ApproverDiff::compute(&new, &old);
        assert_eq!(diff.changed.len(), 1);
    }
}
