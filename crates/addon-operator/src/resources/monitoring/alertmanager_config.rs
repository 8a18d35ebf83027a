//! Alert routing to PagerDuty and Dead Man's Snitch.
//!
//! Both destinations come from secrets provisioned outside the operator. They
//! are validated before any AlertmanagerConfig write, and a missing secret or
//! key fails the step.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use serde_json::{json, Value};

use crate::error::{AddonOperatorError, AddonOperatorResult};
use crate::k8s::{from_dynamic, kinds, set_controller_reference, set_field, ObjectKey};
use crate::operator::condition::Condition;
use crate::operator::crd::Monitoring;
use crate::resources::{
    delete_object, upsert, ReconcileContext, ReconcileFailure, ReconcileOutcome, ResourceReconciler,
};

use super::child_key;

pub const CONDITION_TYPE: &str = "AlertmanagerConfigDeployed";

const ALERTMANAGER_CONFIG_NAME: &str = "gpuaddon-alertmanager-config";
const PAGER_DUTY_KEY: &str = "PAGERDUTY_KEY";
const SNITCH_URL_KEY: &str = "SNITCH_URL";
const PAGER_DUTY_ALERTS: &[&str] = &["NVIDIAGPUAddonGPUOperatorSubscriptionInstallationPending"];

pub struct AlertmanagerConfigReconciler;

fn key(ctx: &ReconcileContext) -> ObjectKey {
    child_key(kinds::alertmanager_config(), &ctx.settings, ALERTMANAGER_CONFIG_NAME)
}

/// Anchored alternation matching exactly the given alert names.
fn regex_matcher(alerts: &[&str]) -> String {
    format!("^{}$", alerts.join("$|^"))
}

/// Reads `entry` from the secret `name`, failing if the secret or the entry is missing.
async fn secret_entry(
    ctx: &ReconcileContext,
    name: &str,
    entry: &str,
) -> AddonOperatorResult<Vec<u8>> {
    let key = child_key(kinds::secret(), &ctx.settings, name);
    let object = ctx
        .store
        .get(&key)
        .await?
        .ok_or_else(|| AddonOperatorError::Precondition(format!("secret {key} not found")))?;
    let secret: Secret = from_dynamic(&object)?;

    secret
        .data
        .and_then(|mut data| data.remove(entry))
        .map(|bytes| bytes.0)
        .ok_or_else(|| {
            AddonOperatorError::Precondition(format!("entry {entry} is missing from secret {key}"))
        })
}

/// Checks both secrets and returns the snitch URL.
async fn destinations(ctx: &ReconcileContext) -> AddonOperatorResult<String> {
    secret_entry(ctx, &ctx.settings.pager_duty_secret_name, PAGER_DUTY_KEY).await?;
    let url = secret_entry(ctx, &ctx.settings.dead_mans_snitch_secret_name, SNITCH_URL_KEY).await?;
    String::from_utf8(url).map_err(|e| {
        AddonOperatorError::Precondition(format!("{SNITCH_URL_KEY} is not valid UTF-8: {e}"))
    })
}

pub fn desired_spec(pager_duty_secret: &str, snitch_url: &str) -> Value {
    json!({
        "route": {
            "receiver": "null",
            "routes": [
                {
                    "groupBy": ["alertname"],
                    "groupWait": "30s",
                    "groupInterval": "5m",
                    "repeatInterval": "12h",
                    "matchers": [{
                        "name": "alertname",
                        "value": regex_matcher(PAGER_DUTY_ALERTS),
                        "matchType": "=~",
                    }],
                    "receiver": "pagerduty",
                },
                {
                    "groupBy": ["alertname"],
                    "groupWait": "30s",
                    "groupInterval": "5m",
                    "repeatInterval": "5m",
                    "matchers": [{
                        "name": "alertname",
                        "value": "DeadMansSnitch",
                        "matchType": "=",
                    }],
                    "receiver": "DeadMansSnitch",
                },
            ],
        },
        "receivers": [
            { "name": "null" },
            {
                "name": "pagerduty",
                "pagerdutyConfigs": [{
                    "serviceKey": { "name": pager_duty_secret, "key": PAGER_DUTY_KEY },
                }],
            },
            {
                "name": "DeadMansSnitch",
                "webhookConfigs": [{ "url": snitch_url }],
            },
        ],
    })
}

#[async_trait]
impl ResourceReconciler<Monitoring> for AlertmanagerConfigReconciler {
    fn name(&self) -> &'static str {
        "AlertmanagerConfig"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, owner: &Monitoring) -> ReconcileOutcome {
        let snitch_url = destinations(ctx)
            .await
            .map_err(|e| ReconcileFailure::lookup(CONDITION_TYPE, e))?;
        let spec = desired_spec(&ctx.settings.pager_duty_secret_name, &snitch_url);

        upsert(ctx, CONDITION_TYPE, &key(ctx), |object| {
            set_controller_reference(owner, object)?;
            set_field(object, "spec", spec);
            Ok(())
        })
        .await?;

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "AlertmanagerConfig deployed successfully",
        )])
    }

    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        delete_object(ctx, &key(ctx)).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;

    use super::*;
    use crate::k8s::fake::FakeStore;
    use crate::k8s::to_dynamic;
    use crate::operator::condition::reason;
    use crate::resources::tests::{context, monitoring, NAMESPACE};

    pub(crate) fn seed_secret(store: &FakeStore, name: &str, entries: &[(&str, &str)]) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        };
        store.seed(&kinds::secret(), to_dynamic(&secret).unwrap());
    }

    pub(crate) fn seed_alerting_secrets(store: &FakeStore) {
        seed_secret(store, "pagerduty", &[(PAGER_DUTY_KEY, "service-key")]);
        seed_secret(store, "deadmanssnitch", &[(SNITCH_URL_KEY, "https://nosnch.in/abc")]);
    }

    #[test]
    fn test_regex_matcher() {
        assert_eq!(regex_matcher(&["A"]), "^A$");
        assert_eq!(regex_matcher(&["A", "B"]), "^A$|^B$");
    }

    #[tokio::test]
    async fn test_routes_reference_secrets() {
        let store = Arc::new(FakeStore::default());
        seed_alerting_secrets(&store);
        let ctx = context(store.clone());

        let conditions = AlertmanagerConfigReconciler
            .reconcile(&ctx, &monitoring())
            .await
            .unwrap();
        assert!(conditions[0].is_true());

        let object = store.object(&key(&ctx)).unwrap();
        let spec = &object.data["spec"];
        assert_eq!(spec["route"]["receiver"], "null");
        assert_eq!(
            spec["route"]["routes"][0]["matchers"][0]["value"],
            "^NVIDIAGPUAddonGPUOperatorSubscriptionInstallationPending$"
        );
        assert_eq!(spec["route"]["routes"][1]["repeatInterval"], "5m");
        assert_eq!(
            spec["receivers"][1]["pagerdutyConfigs"][0]["serviceKey"]["name"],
            "pagerduty"
        );
        assert_eq!(
            spec["receivers"][2]["webhookConfigs"][0]["url"],
            "https://nosnch.in/abc"
        );
    }

    #[tokio::test]
    async fn test_missing_pager_duty_key_creates_nothing() {
        let store = Arc::new(FakeStore::default());
        seed_secret(&store, "pagerduty", &[("WRONG_KEY", "x")]);
        seed_secret(&store, "deadmanssnitch", &[(SNITCH_URL_KEY, "https://nosnch.in/abc")]);
        let ctx = context(store.clone());
        let writes = store.writes();

        let failure = AlertmanagerConfigReconciler
            .reconcile(&ctx, &monitoring())
            .await
            .unwrap_err();
        assert_eq!(failure.conditions[0].reason, reason::PRECONDITION_FAILED);
        assert!(failure.error.to_string().contains(PAGER_DUTY_KEY));
        assert_eq!(store.count(&kinds::alertmanager_config()), 0);
        assert_eq!(store.writes(), writes);
    }

    #[tokio::test]
    async fn test_missing_snitch_secret_fails() {
        let store = Arc::new(FakeStore::default());
        seed_secret(&store, "pagerduty", &[(PAGER_DUTY_KEY, "service-key")]);
        let ctx = context(store.clone());

        let failure = AlertmanagerConfigReconciler
            .reconcile(&ctx, &monitoring())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AddonOperatorError::Precondition(_)));
        assert_eq!(store.count(&kinds::alertmanager_config()), 0);
    }
}
