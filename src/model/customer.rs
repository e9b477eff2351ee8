use crate::error::AppError;
use crate::model::{generate_id, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Id,
    pub tenant_id: Id,
    pub name: String,
    pub phone: Option<String>,
    /// Normalized plate, unique per tenant.
    pub plate_number: String,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub plate_number: String,
    pub name: String,
    pub phone: Option<String>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
}

impl NewCustomer {
    pub fn validate(&self) -> Result<(), AppError> {
        if normalize_plate(&self.plate_number).is_empty() {
            return Err(AppError::validation("plate number is required"));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::validation("customer name is required"));
        }
        Ok(())
    }

    pub fn into_customer(self, tenant_id: Id) -> Customer {
        Customer {
            id: generate_id(),
            tenant_id,
            name: self.name.trim().to_string(),
            phone: self.phone,
            plate_number: normalize_plate(&self.plate_number),
            vehicle_make: self.vehicle_make,
            vehicle_model: self.vehicle_model,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub plate_number: Option<String>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
}

impl CustomerUpdate {
    pub fn apply_to(self, customer: &mut Customer) {
        if let Some(name) = self.name {
            customer.name = name.trim().to_string();
        }
        if let Some(phone) = self.phone {
            customer.phone = Some(phone);
        }
        if let Some(plate) = self.plate_number {
            customer.plate_number = normalize_plate(&plate);
        }
        if let Some(make) = self.vehicle_make {
            customer.vehicle_make = Some(make);
        }
        if let Some(model) = self.vehicle_model {
            customer.vehicle_model = Some(model);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
    pub q: Option<String>,
}

impl CustomerFilter {
    pub fn matches(&self, customer: &Customer) -> bool {
        match self.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let plate_q = normalize_plate(q);
                customer.name.to_lowercase().contains(&q.to_lowercase())
                    || (!plate_q.is_empty() && customer.plate_number.contains(&plate_q))
            }
            _ => true,
        }
    }
}

/// Uppercase with spaces and dashes removed, so "abc-1234" and "ABC 1234"
/// identify the same vehicle.
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}
