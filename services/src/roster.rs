use sea_orm::DatabaseConnection;
use std::collections::HashSet;

use db::models::student;

use crate::error::ServiceError;

/// How a task's eligible set is selected at creation time. Exactly one
/// mode; the resolved set is snapshotted and never re-queried.
#[derive(Debug, Clone)]
pub enum RosterSelector {
    Students(Vec<i64>),
    Classes(Vec<String>),
}

impl RosterSelector {
    /// Build a selector from the two optional request lists. Empty lists
    /// count as absent; providing neither or both is `InvalidArgument`.
    pub fn from_options(
        student_ids: Option<Vec<i64>>,
        class_names: Option<Vec<String>>,
    ) -> Result<Self, ServiceError> {
        let ids = student_ids.filter(|v| !v.is_empty());
        let classes = class_names.filter(|v| !v.is_empty());
        match (ids, classes) {
            (Some(ids), None) => Ok(RosterSelector::Students(ids)),
            (None, Some(classes)) => Ok(RosterSelector::Classes(classes)),
            (Some(_), Some(_)) => Err(ServiceError::InvalidArgument(
                "student_ids and class_names are mutually exclusive".into(),
            )),
            (None, None) => Err(ServiceError::InvalidArgument(
                "either student_ids or class_names must be provided".into(),
            )),
        }
    }
}

/// Resolve the selector to concrete students. All-or-nothing: any missing
/// student id, or a class union with no members, fails without side effects.
pub async fn resolve(
    db: &DatabaseConnection,
    selector: &RosterSelector,
) -> Result<Vec<student::Model>, ServiceError> {
    match selector {
        RosterSelector::Students(ids) => {
            let unique: HashSet<i64> = ids.iter().copied().collect();
            let found =
                student::Model::find_by_ids(db, &unique.iter().copied().collect::<Vec<_>>())
                    .await?;
            if found.len() != unique.len() {
                let found_ids: HashSet<i64> = found.iter().map(|s| s.id).collect();
                let missing: Vec<String> = unique
                    .difference(&found_ids)
                    .map(|id| id.to_string())
                    .collect();
                return Err(ServiceError::NotFound(format!(
                    "students not found: {}",
                    missing.join(", ")
                )));
            }
            Ok(found)
        }
        RosterSelector::Classes(names) => {
            let found = student::Model::find_by_class_names(db, names).await?;
            if found.is_empty() {
                return Err(ServiceError::NotFound(
                    "no students found in the specified classes".into(),
                ));
            }
            Ok(found)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::test_utils::setup_test_db;

    async fn seed_student(db: &DatabaseConnection, number: &str, class: &str) -> student::Model {
        student::Model::create(
            db,
            number,
            &format!("{number}@test.edu"),
            number,
            class,
            None,
            None,
            None,
            "pw",
        )
        .await
        .unwrap()
    }

    #[test]
    fn selector_requires_exactly_one_mode() {
        assert!(matches!(
            RosterSelector::from_options(None, None),
            Err(ServiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            RosterSelector::from_options(Some(vec![1]), Some(vec!["CS-1".into()])),
            Err(ServiceError::InvalidArgument(_))
        ));
        // Empty lists are treated as absent.
        assert!(matches!(
            RosterSelector::from_options(Some(vec![]), Some(vec![])),
            Err(ServiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            RosterSelector::from_options(Some(vec![1]), Some(vec![])),
            Ok(RosterSelector::Students(_))
        ));
    }

    #[tokio::test]
    async fn resolve_by_ids_is_all_or_nothing() {
        let db = setup_test_db().await;
        let a = seed_student(&db, "s1", "CS-1").await;

        let ok = resolve(&db, &RosterSelector::Students(vec![a.id]))
            .await
            .unwrap();
        assert_eq!(ok.len(), 1);

        let err = resolve(&db, &RosterSelector::Students(vec![a.id, 9999]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolve_by_classes_unions_and_rejects_empty() {
        let db = setup_test_db().await;
        seed_student(&db, "s1", "CS-1").await;
        seed_student(&db, "s2", "CS-2").await;
        seed_student(&db, "s3", "CS-2").await;

        let union = resolve(
            &db,
            &RosterSelector::Classes(vec!["CS-1".into(), "CS-2".into()]),
        )
        .await
        .unwrap();
        assert_eq!(union.len(), 3);

        let err = resolve(&db, &RosterSelector::Classes(vec!["EE-9".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
