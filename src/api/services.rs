//! List, load, save and delete services for the pricing editor.

use serde::Serialize;

use super::{segment, DataEnvelope};
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::pricing::{Service, ServicePayload};

/// Where a new service is filed. Required by the create endpoint only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePlacement {
    pub affiliate_id: serde_json::Value,
    pub vehicle_id: serde_json::Value,
    pub service_category_id: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct CreateServiceRequest<'a> {
    #[serde(flatten)]
    placement: &'a ServicePlacement,
    #[serde(flatten)]
    service: &'a ServicePayload,
}

/// Services filed under one tenant, vehicle and category.
pub async fn list_services(
    client: &ApiClient,
    tenant_id: &str,
    vehicle_id: &str,
    category_id: &str,
) -> Result<Vec<Service>, ApiError> {
    let endpoint = format!(
        "/api/services/tenant/{}/vehicle/{}/category/{}",
        segment(tenant_id),
        segment(vehicle_id),
        segment(category_id)
    );
    let envelope: DataEnvelope<serde_json::Value> = client.get(&endpoint).await?;
    match envelope.ensure_success("services")? {
        Some(serde_json::Value::Array(records)) => records.iter().map(Service::from_json).collect(),
        Some(serde_json::Value::Null) | None => Ok(Vec::new()),
        // Some deployments answer a single match without the array.
        Some(record) => Ok(vec![Service::from_json(&record)?]),
    }
}

pub async fn delete_service(client: &ApiClient, id: &str) -> Result<(), ApiError> {
    let envelope: DataEnvelope<serde_json::Value> = client
        .delete(&format!("/api/services/{}", segment(id)))
        .await?;
    envelope.ensure_success("delete service")?;
    log::info!("Services: deleted {}", id);
    Ok(())
}

pub async fn get_service(client: &ApiClient, id: &str) -> Result<Service, ApiError> {
    let envelope: DataEnvelope<serde_json::Value> = client
        .get(&format!("/api/services/{}", segment(id)))
        .await?;
    Service::from_json(&envelope.into_data("service")?)
}

/// Create or update `service` and return it with its server id.
///
/// Nothing is sent when the service does not validate.
pub async fn save_service(
    client: &ApiClient,
    service: &Service,
    placement: &ServicePlacement,
) -> Result<Service, ApiError> {
    let payload = service.submission_payload()?;

    match service.id() {
        Some(id) => {
            let envelope: DataEnvelope<serde_json::Value> = client
                .put(&format!("/api/services/{}", segment(id)), &payload)
                .await?;
            envelope.into_data("service")?;
            log::info!("Services: updated {} ({} tiers)", id, payload.tiers.len());
            Ok(service.clone())
        }
        None => {
            let body = CreateServiceRequest {
                placement,
                service: &payload,
            };
            let envelope: DataEnvelope<serde_json::Value> =
                client.post("/api/services", &body).await?;
            let created = envelope.into_data("service")?;
            let id = match created.get("id") {
                Some(serde_json::Value::Number(n)) => n.to_string(),
                Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
                _ => {
                    return Err(ApiError::InvalidResponse(
                        "created service has no id".to_string(),
                    ))
                }
            };
            log::info!("Services: created {} ({} tiers)", id, payload.tiers.len());
            Ok(service.with_id(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{client_with, seeded_store, CountingListener, Reply, ScriptedTransport};
    use crate::client::Method;
    use crate::pricing::Tier;
    use std::sync::Arc;

    fn placement() -> ServicePlacement {
        ServicePlacement {
            affiliate_id: serde_json::json!(3),
            vehicle_id: serde_json::json!(1),
            service_category_id: serde_json::json!(4),
        }
    }

    #[tokio::test]
    async fn test_get_service_builds_tiers() {
        let transport = ScriptedTransport::new(|_| {
            Reply::json(
                200,
                serde_json::json!({
                    "success": true,
                    "data": {
                        "id": 41,
                        "name": "Ceramic Coating",
                        "basePrice": 400,
                        "tiers": [{"id": 9, "name": "Basic", "price": 400, "duration": 4, "features": ["prep"]}]
                    }
                }),
            )
        });
        let client = client_with(
            transport,
            seeded_store("A1", "R1"),
            Arc::new(CountingListener::default()),
        );

        let service = get_service(&client, "41").await.unwrap();

        assert_eq!(service.id(), Some("41"));
        assert_eq!(service.tier("9").unwrap().service_options(), ["prep"]);
    }

    #[tokio::test]
    async fn test_new_service_is_created_with_placement() {
        let transport = ScriptedTransport::new(|_| {
            Reply::json(
                201,
                serde_json::json!({"success": true, "data": {"id": 77, "name": "Wash"}}),
            )
        });
        let client = client_with(
            transport.clone(),
            seeded_store("A1", "R1"),
            Arc::new(CountingListener::default()),
        );
        let draft = Service::draft("Wash");
        let tier_id = draft.tiers()[0].id().to_string();
        let draft = draft
            .with_tier_replaced(draft.tiers()[0].with_name("Basic").with_price(40.0))
            .unwrap();

        let saved = save_service(&client, &draft, &placement()).await.unwrap();

        assert_eq!(saved.id(), Some("77"));
        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::POST);
        let body = sent.body.as_ref().unwrap();
        assert_eq!(body["affiliate_id"], 3);
        assert_eq!(body["name"], "Wash");
        assert_eq!(body["tiers"][0]["id"], tier_id.as_str());
    }

    #[tokio::test]
    async fn test_existing_service_is_updated() {
        let transport = ScriptedTransport::new(|_| {
            Reply::json(200, serde_json::json!({"success": true, "data": {"id": 41}}))
        });
        let client = client_with(
            transport.clone(),
            seeded_store("A1", "R1"),
            Arc::new(CountingListener::default()),
        );
        let service = Service::draft("Detail")
            .with_id("41")
            .with_tier(Tier::new("t2", "Premium", 90.0, 2.0));

        let saved = save_service(&client, &service, &placement()).await.unwrap();

        assert_eq!(saved, service);
        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.path_and_query(), "/api/services/41");
        // The blank default tier is not submitted.
        assert_eq!(sent.body.as_ref().unwrap()["tiers"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_services_for_category() {
        let transport = ScriptedTransport::new(|req| {
            assert_eq!(req.method, Method::GET);
            assert_eq!(
                req.path_and_query(),
                "/api/services/tenant/3/vehicle/1/category/4"
            );
            Reply::json(
                200,
                serde_json::json!({
                    "success": true,
                    "data": [
                        {"id": 41, "name": "Ceramic Coating", "tiers": [{"id": 9, "name": "Basic", "features": ["prep"]}]},
                        {"id": 42, "name": "Paint Correction"}
                    ]
                }),
            )
        });
        let client = client_with(
            transport,
            seeded_store("A1", "R1"),
            Arc::new(CountingListener::default()),
        );

        let services = list_services(&client, "3", "1", "4").await.unwrap();

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].tier("9").unwrap().service_options(), ["prep"]);
        assert_eq!(services[1].id(), Some("42"));
        assert_eq!(services[1].tiers().len(), 1);
    }

    #[tokio::test]
    async fn test_list_services_accepts_single_record() {
        let transport = ScriptedTransport::new(|_| {
            Reply::json(
                200,
                serde_json::json!({"success": true, "data": {"id": 41, "name": "Ceramic Coating"}}),
            )
        });
        let client = client_with(
            transport,
            seeded_store("A1", "R1"),
            Arc::new(CountingListener::default()),
        );

        let services = list_services(&client, "3", "1", "4").await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name(), "Ceramic Coating");
    }

    #[tokio::test]
    async fn test_delete_service() {
        let transport = ScriptedTransport::new(|req| {
            assert_eq!(req.method, Method::DELETE);
            assert_eq!(req.path_and_query(), "/api/services/41");
            Reply::json(200, serde_json::json!({"success": true}))
        });
        let client = client_with(
            transport.clone(),
            seeded_store("A1", "R1"),
            Arc::new(CountingListener::default()),
        );

        delete_service(&client, "41").await.unwrap();
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_service_reports_server_failure() {
        let transport = ScriptedTransport::new(|_| {
            Reply::json(
                200,
                serde_json::json!({"success": false, "error": "Service has bookings"}),
            )
        });
        let client = client_with(
            transport,
            seeded_store("A1", "R1"),
            Arc::new(CountingListener::default()),
        );

        let err = delete_service(&client, "41").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::InvalidResponse("delete service: Service has bookings".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_service_sends_nothing() {
        let transport = ScriptedTransport::new(|_| Reply::json(200, serde_json::json!({})));
        let client = client_with(
            transport.clone(),
            seeded_store("A1", "R1"),
            Arc::new(CountingListener::default()),
        );

        let err = save_service(&client, &Service::draft(""), &placement())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(transport.requests().is_empty());
    }
}
