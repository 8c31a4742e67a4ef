// libs/catalog-cell/src/services/catalog.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    CatalogError, Dependant, DiagnosticCenter, Doctor, HealthPackage,
    LabTest, SponsoredPackage,
};

/// Read-only access to the catalog reference data (tests, packages, centers,
/// doctors). The booking core consumes this data but never writes it.
pub struct CatalogService {
    supabase: Arc<SupabaseClient>,
}

impl CatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_tests(
        &self,
        test_ids: &[Uuid],
        auth_token: &str,
    ) -> Result<Vec<LabTest>, CatalogError> {
        if test_ids.is_empty() {
            return Ok(vec![]);
        }

        let id_list = test_ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/rest/v1/lab_tests?id=in.({})&is_active=eq.true", id_list);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| CatalogError::DatabaseError(e.to_string()))?;

        let tests: Vec<LabTest> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<LabTest>, _>>()
            .map_err(|e| CatalogError::DatabaseError(format!("Failed to parse lab tests: {}", e)))?;

        debug!("Fetched {} of {} requested lab tests", tests.len(), test_ids.len());
        Ok(tests)
    }

    pub async fn get_diagnostic_center(
        &self,
        center_id: Uuid,
        auth_token: &str,
    ) -> Result<DiagnosticCenter, CatalogError> {
        let path = format!("/rest/v1/diagnostic_centers?id=eq.{}", center_id);
        self.fetch_one(&path, "Diagnostic center", auth_token).await
    }

    pub async fn get_health_package(
        &self,
        package_id: Uuid,
        auth_token: &str,
    ) -> Result<HealthPackage, CatalogError> {
        let path = format!("/rest/v1/health_packages?id=eq.{}&is_active=eq.true", package_id);
        self.fetch_one(&path, "Health package", auth_token).await
    }

    pub async fn get_sponsored_package(
        &self,
        package_id: Uuid,
        auth_token: &str,
    ) -> Result<SponsoredPackage, CatalogError> {
        let path = format!("/rest/v1/sponsored_packages?id=eq.{}&is_active=eq.true", package_id);
        self.fetch_one(&path, "Sponsored package", auth_token).await
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Doctor, CatalogError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&is_active=eq.true", doctor_id);
        self.fetch_one(&path, "Doctor", auth_token).await
    }

    /// Resolve a dependant and verify it belongs to the acting user.
    pub async fn get_dependant(
        &self,
        dependant_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Dependant, CatalogError> {
        let path = format!(
            "/rest/v1/dependants?id=eq.{}&user_id=eq.{}",
            dependant_id, user_id
        );
        self.fetch_one(&path, "Dependant", auth_token).await
    }

    async fn fetch_one<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        entity: &str,
        auth_token: &str,
    ) -> Result<T, CatalogError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await.map_err(|e| CatalogError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next()
            .ok_or_else(|| CatalogError::NotFound(entity.to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| CatalogError::DatabaseError(format!("Failed to parse {}: {}", entity, e)))
    }
}
