use crate::error::AppError;
use crate::model::{
    check_money, generate_id, Bill, Customer, Id, NewCustomer, PaymentMethod, PaymentStatus,
    UnknownVariant,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const JOB_NUMBER_PREFIX: &str = "JO";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Open => "OPEN",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(JobStatus::Open),
            "IN_PROGRESS" => Ok(JobStatus::InProgress),
            "COMPLETED" => Ok(JobStatus::Completed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            other => Err(UnknownVariant::new("job status", other)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOrder {
    pub id: Id,
    pub tenant_id: Id,
    pub branch_id: Id,
    pub job_number: String,
    pub customer_id: Id,
    pub description: Option<String>,
    pub status: JobStatus,
    pub labor_cost: Decimal,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobOrder {
    pub fn open(
        tenant_id: Id,
        branch_id: Id,
        job_number: String,
        customer_id: Id,
        description: Option<String>,
        created_by: Id,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            tenant_id,
            branch_id,
            job_number,
            customer_id,
            description,
            status: JobStatus::Open,
            labor_cost: Decimal::ZERO,
            created_by,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Fails unless the job still accepts stock movements and billing.
    pub fn ensure_workable(&self) -> Result<(), AppError> {
        if self.status.is_terminal() {
            Err(AppError::InvalidJobState {
                job_number: self.job_number.clone(),
                status: self.status,
            })
        } else {
            Ok(())
        }
    }
}

/// A part issued to a job order. At most one per product per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOrderItem {
    pub id: Id,
    pub job_order_id: Id,
    pub product_id: Id,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl JobOrderItem {
    pub fn new(job_order_id: Id, product_id: Id, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            id: generate_id(),
            job_order_id,
            product_id,
            quantity,
            unit_price,
            created_at: Utc::now(),
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJobOrder {
    pub branch_id: Option<Id>,
    pub customer: NewCustomer,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobOrderUpdate {
    pub description: Option<String>,
    pub labor_cost: Option<Decimal>,
}

impl JobOrderUpdate {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(labor_cost) = self.labor_cost {
            if labor_cost < Decimal::ZERO {
                return Err(AppError::validation("labor cost cannot be negative"));
            }
            check_money(labor_cost, "labor_cost")?;
        }
        Ok(())
    }

    /// Apply to a job that is still open for work. Status and completion
    /// time are never touched here.
    pub fn apply_to(&self, job: &mut JobOrder) -> Result<(), AppError> {
        job.ensure_workable()?;
        if let Some(labor_cost) = self.labor_cost {
            job.labor_cost = labor_cost;
        }
        if let Some(description) = &self.description {
            job.description = Some(description.clone());
        }
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobOrderFilter {
    pub status: Option<JobStatus>,
    pub customer_id: Option<Id>,
    pub branch_id: Option<Id>,
}

impl JobOrderFilter {
    pub fn matches(&self, job: &JobOrder) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self.customer_id.as_ref().map_or(true, |id| &job.customer_id == id)
            && self.branch_id.as_ref().map_or(true, |id| &job.branch_id == id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOrderDetail {
    pub job_order: JobOrder,
    pub customer: Option<Customer>,
    pub items: Vec<JobOrderItem>,
    pub bill: Option<Bill>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub labor_cost: Option<Decimal>,
    pub payment_method: PaymentMethod,
    pub payment_status: Option<PaymentStatus>,
}
