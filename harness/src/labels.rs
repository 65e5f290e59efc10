use std::collections::BTreeMap;

/// Label the app platform uses to pick which app-operator reconciles an App.
pub const APP_OPERATOR_VERSION_LABEL: &str = "app-operator.giantswarm.io/version";

/// Labels put on every App created by the harness.
///
/// Version `0.0.0` hands the App to the cluster's own app-operator.
pub fn app_labels(app: &str) -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from_iter(vec![
        ("app".to_owned(), app.to_owned()),
        (APP_OPERATOR_VERSION_LABEL.to_owned(), "0.0.0".to_owned()),
    ]))
}

/// Labels put on every Catalog created by the harness.
pub fn catalog_labels() -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from_iter(vec![
        (
            "application.giantswarm.io/catalog-type".to_owned(),
            "test".to_owned(),
        ),
        (
            "application.giantswarm.io/catalog-visibility".to_owned(),
            "internal".to_owned(),
        ),
    ]))
}

/// Render labels as an equality based label selector, i.e. `a=1,b=2`.
pub fn selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<String>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn selector_joins_labels_in_key_order() {
        let labels = BTreeMap::from_iter([
            (
                "app.kubernetes.io/name".to_owned(),
                "observability-operator".to_owned(),
            ),
            (
                "app.kubernetes.io/instance".to_owned(),
                "observability-operator".to_owned(),
            ),
        ]);
        assert_eq!(
            selector(&labels),
            "app.kubernetes.io/instance=observability-operator,app.kubernetes.io/name=observability-operator"
        );
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert_eq!(selector(&BTreeMap::new()), "");
    }

    #[test]
    fn app_labels_pin_the_cluster_app_operator() {
        let labels = app_labels("grafana").unwrap();
        assert_eq!(labels["app"], "grafana");
        assert_eq!(labels[APP_OPERATOR_VERSION_LABEL], "0.0.0");
    }
}
