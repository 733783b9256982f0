use chrono::{Datelike, NaiveDate, Utc};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::auth::{Action, AuthUser};
use crate::errors::ServiceError;
use crate::models::dates::format_date;
use crate::models::purchase_request::decimal_json;
use crate::models::reception::RECEPTION_EXPAND;
use crate::models::{
    DocumentType, HistoryAction, PurchaseState, Reception, ReceptionDetail, ReceptionState,
};
use crate::services::folio::FolioGenerator;
use crate::services::history::{diff, HistoryService};
use crate::services::purchase_requests::{validate_not_blank, PurchaseRequestService};
use crate::store::{
    collections, decode_record, Filter, ListQuery, RecordPage, RecordStore, StoreError,
};

fn validate_positive_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Quantity must be greater than 0".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewReceptionDetail {
    #[validate(custom = "validate_positive_quantity")]
    pub cantidad: Decimal,
    #[validate(length(min = 1, max = 500), custom = "validate_not_blank")]
    pub descripcion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReception {
    #[validate(length(min = 1, message = "Compra is required"))]
    pub compra: String,
    pub orden_compra: Option<String>,
    pub fecha_recepcion: NaiveDate,
    pub tipo_documento: DocumentType,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub numero_documento: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub observaciones: String,
    #[validate(length(min = 1, message = "At least one detail line is required"))]
    pub detalles: Vec<NewReceptionDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateReception {
    pub fecha_recepcion: Option<NaiveDate>,
    pub tipo_documento: Option<DocumentType>,
    #[validate(length(max = 50))]
    pub numero_documento: Option<String>,
    #[validate(length(max = 2000))]
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReceptionFilters {
    pub compra: Option<String>,
    pub estado: Option<ReceptionState>,
    #[validate(range(min = 2000, max = 2100))]
    pub year: Option<i32>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ReceptionFilters {
    pub fn to_filter(&self) -> Option<Filter> {
        let mut parts = Vec::new();
        if let Some(purchase) = self.compra.as_deref().filter(|c| !c.trim().is_empty()) {
            parts.push(Filter::eq("compra", purchase.trim()));
        }
        if let Some(state) = self.estado {
            parts.push(Filter::eq("estado", state.to_string()));
        }
        if let Some(year) = self.year {
            parts.push(Filter::within_year("fecha_recepcion", year));
        }
        Filter::all(parts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CancelReception {
    #[validate(
        length(min = 1, max = 500, message = "A cancellation reason is required"),
        custom = "validate_not_blank"
    )]
    pub motivo: String,
}

/// A reception together with download URLs for its attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptionView {
    #[serde(flatten)]
    pub reception: Reception,
    pub attachment_urls: Vec<String>,
}

/// Warehouse receptions: folio assignment, detail lines and cancellation.
#[derive(Clone)]
pub struct ReceptionService {
    store: Arc<dyn RecordStore>,
    folios: FolioGenerator,
    purchases: PurchaseRequestService,
    history: HistoryService,
    max_retries: u32,
}

impl ReceptionService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        purchases: PurchaseRequestService,
        history: HistoryService,
        max_retries: u32,
    ) -> Self {
        Self {
            folios: FolioGenerator::new(store.clone()),
            store,
            purchases,
            history,
            max_retries: max_retries.max(1),
        }
    }

    fn view(&self, reception: Reception) -> ReceptionView {
        let attachment_urls = reception
            .documents
            .iter()
            .map(|file| self.store.file_url(collections::RECEPCIONES, &reception.id, file))
            .collect();
        ReceptionView {
            reception,
            attachment_urls,
        }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filters: ReceptionFilters,
    ) -> Result<RecordPage<Reception>, ServiceError> {
        filters.validate()?;
        let mut query = ListQuery::new()
            .page(filters.page.unwrap_or(1), filters.per_page.unwrap_or(30))
            .sort("-folio")
            .expand("compra,orden_compra");
        if let Some(filter) = filters.to_filter() {
            query = query.filter(filter.to_string());
        }
        let page = self.store.list(collections::RECEPCIONES, &query).await?;
        Ok(page.decode()?)
    }

    async fn fetch(&self, id: &str) -> Result<Reception, ServiceError> {
        let value = self
            .store
            .get_one(collections::RECEPCIONES, id, Some(RECEPTION_EXPAND.to_string()))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    ServiceError::NotFound(format!("Recepción {} not found", id))
                }
                other => other.into(),
            })?;
        Ok(decode_record(value)?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<ReceptionView, ServiceError> {
        Ok(self.view(self.fetch(id).await?))
    }

    /// Folio the next reception would get right now. Not reserved.
    pub async fn next_folio(&self) -> Result<String, ServiceError> {
        Ok(self.folios.next_folio(Utc::now().year()).await?)
    }

    /// Inserts the header, drawing a fresh folio whenever the store reports
    /// the previous one as taken.
    async fn insert_header(&self, mut body: Value) -> Result<Reception, ServiceError> {
        let year = Utc::now().year();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let folio = self.folios.next_folio(year).await?;
            body["folio"] = json!(folio);
            match self.store.create(collections::RECEPCIONES, body.clone()).await {
                Ok(created) => return Ok(decode_record(created)?),
                Err(StoreError::UniqueViolation { field }) if field == "folio" => {
                    if attempt >= self.max_retries {
                        error!(%folio, attempt, "giving up on folio assignment");
                        return Err(ServiceError::Conflict(format!(
                            "Could not assign a unique folio after {} attempts",
                            attempt
                        )));
                    }
                    warn!(%folio, attempt, "folio taken concurrently, retrying");
                }
                Err(e) => {
                    error!(error = %e, "failed to create reception");
                    return Err(e.into());
                }
            }
        }
    }

    /// Records a reception. A `Comprado` compra moves to `En Bodega`.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id, compra = %request.compra))]
    pub async fn create(
        &self,
        actor: &AuthUser,
        request: CreateReception,
    ) -> Result<ReceptionView, ServiceError> {
        actor.require(Action::CreateReception)?;
        request.validate()?;
        for line in &request.detalles {
            line.validate()?;
        }

        let purchase = self.purchases.get(request.compra.trim()).await?;
        if purchase.state == PurchaseState::Cancelled {
            return Err(ServiceError::InvalidOperation(
                "Compra is cancelled and cannot receive goods".to_string(),
            ));
        }

        let order_id = request
            .orden_compra
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        if let Some(order_id) = order_id {
            if !purchase.expand.orders.iter().any(|o| o.id == order_id) {
                return Err(ServiceError::ValidationError(format!(
                    "orden_compra: order {} does not belong to compra {}",
                    order_id, purchase.id
                )));
            }
        }

        let header = json!({
            "compra": purchase.id,
            "orden_compra": order_id.unwrap_or_default(),
            "fecha_recepcion": format_date(request.fecha_recepcion),
            "tipo_documento": request.tipo_documento,
            "numero_documento": request.numero_documento.trim(),
            "observaciones": request.observaciones.trim(),
            "estado": ReceptionState::Accepted,
            "recibido_por": actor.user_id,
        });
        let mut reception = self.insert_header(header).await?;

        let details = try_join_all(request.detalles.iter().map(|line| {
            let body = json!({
                "recepcion": reception.id,
                "cantidad": decimal_json(line.cantidad),
                "descripcion": line.descripcion.trim(),
            });
            self.store.create(collections::RECEPCION_DETALLES, body)
        }))
        .await
        .map_err(|e| {
            error!(
                error = %e,
                reception_id = %reception.id,
                folio = %reception.folio,
                compra = %purchase.id,
                "failed to store reception details; header left without lines"
            );
            ServiceError::from(e)
        })?;
        reception.expand.details = details
            .into_iter()
            .map(decode_record::<ReceptionDetail>)
            .collect::<Result<_, _>>()?;

        let mut changes = Map::new();
        changes.insert("recepcion".into(), json!(reception.folio));
        self.history
            .record(
                &purchase.id,
                Some(&actor.user_id),
                HistoryAction::Modificacion,
                diff(&Map::new(), &changes),
                None,
            )
            .await?;

        if purchase.state == PurchaseState::Purchased {
            self.purchases
                .apply_transition(&purchase, PurchaseState::InWarehouse, Some(&actor.user_id))
                .await?;
        }

        info!(folio = %reception.folio, lines = reception.expand.details.len(), "reception created");
        Ok(self.view(reception))
    }

    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn update(
        &self,
        actor: &AuthUser,
        id: &str,
        request: UpdateReception,
    ) -> Result<ReceptionView, ServiceError> {
        actor.require(Action::EditReception)?;
        request.validate()?;

        let current = self.fetch(id).await?;
        if current.is_cancelled() {
            return Err(ServiceError::InvalidOperation(format!(
                "Recepción {} is cancelled and can no longer be edited",
                current.folio
            )));
        }

        let mut patch = Map::new();
        if let Some(date) = request.fecha_recepcion {
            patch.insert("fecha_recepcion".into(), json!(format_date(date)));
        }
        if let Some(kind) = request.tipo_documento {
            patch.insert("tipo_documento".into(), json!(kind));
        }
        if let Some(number) = &request.numero_documento {
            patch.insert("numero_documento".into(), json!(number.trim()));
        }
        if let Some(notes) = &request.observaciones {
            patch.insert("observaciones".into(), json!(notes.trim()));
        }
        if patch.is_empty() {
            return Ok(self.view(current));
        }

        self.store
            .update(collections::RECEPCIONES, id, Value::Object(patch))
            .await?;
        self.get(id).await
    }

    /// Cancels a reception. Cancelled receptions are final.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn cancel(
        &self,
        actor: &AuthUser,
        id: &str,
        request: CancelReception,
    ) -> Result<ReceptionView, ServiceError> {
        actor.require(Action::CancelReception)?;
        request.validate()?;

        let current = self.fetch(id).await?;
        if current.is_cancelled() {
            return Err(ServiceError::InvalidTransition(format!(
                "Recepción {} is already cancelled",
                current.folio
            )));
        }

        self.store
            .update(
                collections::RECEPCIONES,
                id,
                json!({
                    "estado": ReceptionState::Cancelled,
                    "motivo_anulacion": request.motivo.trim(),
                }),
            )
            .await?;

        let field = format!("recepcion.{}.estado", current.folio);
        let mut old = Map::new();
        old.insert(field.clone(), json!(current.state));
        let mut new = Map::new();
        new.insert(field, json!(ReceptionState::Cancelled));
        self.history
            .record(
                &current.purchase_request,
                Some(&actor.user_id),
                HistoryAction::Modificacion,
                diff(&old, &new),
                None,
            )
            .await?;

        info!(folio = %current.folio, "reception cancelled");
        self.get(id).await
    }
}
