use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::enrollments::EnrollmentEntity;

/// The signed-in user paying for a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchaser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Purchaser {
    /// Name shown on the checkout page: explicit name, else the email's local part.
    pub fn checkout_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .filter(|local| !local.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Customer".to_string())
    }
}

/// Payload of the create-payment endpoint, as the storefront sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentModel {
    pub is_bundle: Option<bool>,
    pub bundle_price: Option<i64>,
    pub bundle_name: Option<String>,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub course_price: Option<i64>,
    pub local_course_id: Option<i32>,
}

/// Validated purchase selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseSelection {
    Single {
        course: CourseSelector,
        course_name: Option<String>,
        price: Option<i64>,
    },
    Bundle {
        bundle_price: i64,
        bundle_name: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseSelector {
    Id(Uuid),
    LocalId(i32),
}

impl CreatePaymentModel {
    pub fn into_selection(self) -> Result<PurchaseSelection, String> {
        if self.is_bundle.unwrap_or(false) {
            let bundle_price = self
                .bundle_price
                .filter(|price| *price > 0)
                .ok_or_else(|| "bundlePrice is required for a bundle purchase".to_string())?;

            return Ok(PurchaseSelection::Bundle {
                bundle_price,
                bundle_name: self.bundle_name,
            });
        }

        let course = match (self.course_id.as_deref(), self.local_course_id) {
            (Some(raw), local_id) => match Uuid::parse_str(raw.trim()) {
                Ok(id) => CourseSelector::Id(id),
                Err(_) => match local_id.or_else(|| raw.trim().parse().ok()) {
                    Some(local_id) => CourseSelector::LocalId(local_id),
                    None => return Err("courseId is not a valid course identifier".to_string()),
                },
            },
            (None, Some(local_id)) => CourseSelector::LocalId(local_id),
            (None, None) => return Err("courseId is required".to_string()),
        };

        if let Some(price) = self.course_price {
            if price <= 0 {
                return Err("coursePrice must be positive".to_string());
            }
        }

        Ok(PurchaseSelection::Single {
            course,
            course_name: self.course_name,
            price: self.course_price,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPaymentDto {
    pub success: bool,
    pub payment_url: String,
    pub invoice_number: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_bundle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courses_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentDto {
    pub course_id: Uuid,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub amount_paid: i64,
    pub purchased_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<EnrollmentEntity> for EnrollmentDto {
    fn from(entity: EnrollmentEntity) -> Self {
        Self {
            course_id: entity.course_id,
            payment_status: entity.payment_status,
            payment_method: entity.payment_method,
            payment_reference: entity.payment_reference,
            amount_paid: entity.amount_paid,
            purchased_at: entity.purchased_at,
            expires_at: entity.expires_at,
        }
    }
}
