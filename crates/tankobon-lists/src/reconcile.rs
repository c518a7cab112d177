//! Consistency audit between the list index and user documents.

use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tankobon_common::{ContentId, ListName, Result, UserId, UserLists};
use tankobon_store::{membership_key, user_prefix};
use tracing::{info, warn};

use crate::engine::{ListMembershipEngine, place};

/// One disagreement between the index and a user's list arrays
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Index record present, no array holds the item
    IndexOnly { content: ContentId, list: ListName },
    /// Arrays hold the item, no index record
    ArrayOnly {
        content: ContentId,
        lists: Vec<ListName>,
    },
    /// Index names one list, the item sits only in others
    WrongList {
        content: ContentId,
        indexed: ListName,
        found: Vec<ListName>,
    },
    /// The item appears more than once across the arrays
    Duplicated {
        content: ContentId,
        indexed: ListName,
        found: Vec<ListName>,
    },
    /// Index record whose value is not a list name
    InvalidRecord { content: ContentId, value: String },
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub user: Option<UserId>,
    /// Index records examined
    pub records: usize,
    pub anomalies: Vec<Anomaly>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Every list occurrence of an item, one entry per occurrence
fn occurrences(lists: &UserLists, content: &ContentId) -> Vec<ListName> {
    ListName::ALL
        .into_iter()
        .flat_map(|list| {
            let n = lists.get(list).iter().filter(|c| *c == content).count();
            std::iter::repeat_n(list, n)
        })
        .collect()
}

fn distinct(mut lists: Vec<ListName>) -> Vec<ListName> {
    lists.dedup();
    lists
}

/// Audits and repairs one user at a time
pub struct Reconciler {
    engine: Arc<ListMembershipEngine>,
}

impl Reconciler {
    pub fn new(engine: Arc<ListMembershipEngine>) -> Self {
        Self { engine }
    }

    /// Compare the user's index records with the user's arrays
    pub async fn audit(&self, user: &UserId) -> Result<ReconcileReport> {
        let doc = self.engine.load_user(user).await?;
        let prefix = user_prefix(user);
        let records = self.engine.index.scan_prefix(&prefix).await?;

        let mut report = ReconcileReport {
            user: Some(user.clone()),
            records: records.len(),
            anomalies: Vec::new(),
        };
        let mut indexed = BTreeMap::new();

        for (key, value) in records {
            let Some(id) = key.strip_prefix(&prefix) else {
                continue;
            };
            let content = ContentId::new(id);
            match ListName::from_str(&value) {
                Ok(list) => {
                    indexed.insert(content, list);
                }
                Err(_) => report
                    .anomalies
                    .push(Anomaly::InvalidRecord { content, value }),
            }
        }

        for (content, &list) in &indexed {
            let found = occurrences(&doc.lists, content);
            if found == [list] {
                continue;
            }
            let anomaly = if found.is_empty() {
                Anomaly::IndexOnly {
                    content: content.clone(),
                    list,
                }
            } else if !found.contains(&list) {
                Anomaly::WrongList {
                    content: content.clone(),
                    indexed: list,
                    found: distinct(found),
                }
            } else {
                Anomaly::Duplicated {
                    content: content.clone(),
                    indexed: list,
                    found,
                }
            };
            report.anomalies.push(anomaly);
        }

        let mut seen = Vec::new();
        for list in ListName::ALL {
            for content in doc.lists.get(list) {
                if indexed.contains_key(content) || seen.contains(content) {
                    continue;
                }
                seen.push(content.clone());
                report.anomalies.push(Anomaly::ArrayOnly {
                    content: content.clone(),
                    lists: distinct(occurrences(&doc.lists, content)),
                });
            }
        }

        if !report.is_consistent() {
            warn!(
                "{} list anomalies for {}: {:?}",
                report.anomalies.len(),
                user,
                report.anomalies
            );
        }
        Ok(report)
    }

    /// Audit, then make both stores agree. The index is authoritative; items
    /// only found in arrays are indexed under the first list holding them.
    /// Returns the anomalies found before repair.
    ///
    /// Not serialized against concurrent list operations on the same items;
    /// run it while the user is idle.
    pub async fn repair(&self, user: &UserId) -> Result<ReconcileReport> {
        let _user = self.engine.user_locks.lock(user.clone()).await;
        let report = self.audit(user).await?;
        if report.is_consistent() {
            return Ok(report);
        }

        let mut lists = self.engine.load_user(user).await?.lists;

        for anomaly in &report.anomalies {
            match anomaly {
                Anomaly::IndexOnly { content, list } => {
                    lists.push(*list, content);
                }
                Anomaly::WrongList {
                    content, indexed, ..
                }
                | Anomaly::Duplicated {
                    content, indexed, ..
                } => place(&mut lists, content, *indexed),
                Anomaly::ArrayOnly {
                    content,
                    lists: found,
                } => {
                    let Some(&first) = found.first() else {
                        continue;
                    };
                    self.engine
                        .index
                        .set(&membership_key(user, content), first.as_str())
                        .await?;
                    place(&mut lists, content, first);
                }
                Anomaly::InvalidRecord { content, .. } => {
                    // Arrays still holding the item surface as ArrayOnly
                    self.engine
                        .index
                        .delete(&membership_key(user, content))
                        .await?;
                }
            }
        }

        self.engine.replace_lists(user, lists).await?;
        info!(
            "Repaired {} list anomalies for {}",
            report.anomalies.len(),
            user
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::Fixture;
    use std::sync::atomic::Ordering;
    use tankobon_common::User;
    use tankobon_store::{DocumentStore, IndexStore};

    async fn edit_lists(fx: &Fixture, edit: impl FnOnce(&mut UserLists)) {
        let mut user = DocumentStore::<User>::find_by_id(&*fx.docs, "u1")
            .await
            .unwrap()
            .unwrap();
        edit(&mut user.lists);
        fx.docs.save(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_consistent_user() {
        let fx = Fixture::new().await;
        let u1 = UserId::new("u1");
        fx.engine
            .move_to_list(&u1, &ContentId::new("c1"), ListName::Reading)
            .await
            .unwrap();

        let report = Reconciler::new(fx.engine.clone()).audit(&u1).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.records, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_detected_and_repaired() {
        let fx = Fixture::new().await;
        let (u1, c1) = (UserId::new("u1"), ContentId::new("c1"));
        fx.users.fail_saves.store(true, Ordering::SeqCst);
        fx.engine
            .move_to_list(&u1, &c1, ListName::Planned)
            .await
            .unwrap_err();
        fx.users.fail_saves.store(false, Ordering::SeqCst);

        let reconciler = Reconciler::new(fx.engine.clone());
        let report = reconciler.audit(&u1).await.unwrap();
        assert_eq!(
            report.anomalies,
            vec![Anomaly::IndexOnly {
                content: c1.clone(),
                list: ListName::Planned,
            }]
        );

        reconciler.repair(&u1).await.unwrap();
        assert!(reconciler.audit(&u1).await.unwrap().is_consistent());
        assert_eq!(fx.lists().await.planned, vec![c1]);
    }

    #[tokio::test]
    async fn test_array_drift_repaired_from_index() {
        let fx = Fixture::new().await;
        let u1 = UserId::new("u1");
        let (c1, c2, c3) = (ContentId::new("c1"), ContentId::new("c2"), ContentId::new("c3"));
        fx.engine.move_to_list(&u1, &c1, ListName::Reading).await.unwrap();
        fx.engine.move_to_list(&u1, &c2, ListName::Reading).await.unwrap();

        edit_lists(&fx, |lists| {
            // c1 moved without the index, c2 copied, c3 never indexed
            lists.remove(ListName::Reading, &c1);
            lists.push(ListName::Abandoned, &c1);
            lists.push(ListName::Planned, &c2);
            lists.push(ListName::Abandoned, &c3);
        })
        .await;
        fx.index.set("u1_c9", "favourites").await.unwrap();

        let reconciler = Reconciler::new(fx.engine.clone());
        let report = reconciler.audit(&u1).await.unwrap();
        assert_eq!(report.records, 3);
        assert!(report.anomalies.contains(&Anomaly::WrongList {
            content: c1.clone(),
            indexed: ListName::Reading,
            found: vec![ListName::Abandoned],
        }));
        assert!(report.anomalies.contains(&Anomaly::Duplicated {
            content: c2.clone(),
            indexed: ListName::Reading,
            found: vec![ListName::Reading, ListName::Planned],
        }));
        assert!(report.anomalies.contains(&Anomaly::ArrayOnly {
            content: c3.clone(),
            lists: vec![ListName::Abandoned],
        }));
        assert!(report.anomalies.contains(&Anomaly::InvalidRecord {
            content: ContentId::new("c9"),
            value: "favourites".to_string(),
        }));

        reconciler.repair(&u1).await.unwrap();
        assert!(reconciler.audit(&u1).await.unwrap().is_consistent());

        let lists = fx.lists().await;
        assert_eq!(lists.lists_containing(&c1), vec![ListName::Reading]);
        assert_eq!(lists.lists_containing(&c2), vec![ListName::Reading]);
        assert_eq!(lists.abandoned, vec![c3]);
        assert_eq!(fx.index.get("u1_c3").await.unwrap().as_deref(), Some("abandoned"));
        assert!(!fx.index.has("u1_c9").await.unwrap());
    }

    #[test]
    fn test_occurrences_counts_repeats() {
        let c1 = ContentId::new("c1");
        let lists = UserLists {
            reading: vec![c1.clone(), c1.clone()],
            abandoned: vec![],
            planned: vec![c1.clone()],
        };
        assert_eq!(
            occurrences(&lists, &c1),
            vec![ListName::Reading, ListName::Reading, ListName::Planned]
        );
    }
}
