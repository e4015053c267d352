use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// Product entity as exposed over the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    /// Unique identifier, assigned at creation
    pub id: Uuid,
    /// Product name, unique across all products
    pub name: String,
    /// Units in stock
    pub quantity: i64,
    /// Exact decimal price, serialized as a string (e.g. "19.99")
    pub price: Decimal,
    /// Whether the product is active
    pub status: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// DTO for creating a new product
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(range(min = 0))]
    pub quantity: i64,

    /// Accepts a decimal string or a JSON number
    #[validate(custom(function = "validate_price"))]
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,

    #[serde(default = "default_status")]
    pub status: bool,
}

/// A field in a partial update: absent, explicitly `null`, or a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Missing,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Missing
    }
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Patch::Missing)
    }

    /// The supplied value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Patch::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Patch::Value(v) => Some(v),
            _ => None,
        }
    }
}

// Only reached for keys present in the payload; absent keys take
// `#[serde(default)]` and stay `Missing`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|v| v.map_or(Patch::Null, Patch::Value))
    }
}

/// DTO for partially updating a product. `name` cannot be changed.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateProduct {
    #[serde(default)]
    #[schema(value_type = Option<i64>, minimum = 0)]
    pub quantity: Patch<i64>,

    #[serde(default)]
    #[schema(value_type = Option<String>, example = "24.50")]
    pub price: Patch<Decimal>,

    #[serde(default)]
    #[schema(value_type = Option<bool>)]
    pub status: Patch<bool>,

    /// Explicit timestamp override; stamped with the current time when absent
    #[serde(default)]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub updated_at: Patch<DateTime<Utc>>,
}

impl Validate for UpdateProduct {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        reject_null(&mut errors, "quantity", &self.quantity);
        reject_null(&mut errors, "price", &self.price);
        reject_null(&mut errors, "status", &self.status);
        reject_null(&mut errors, "updated_at", &self.updated_at);

        if let Some(quantity) = self.quantity.value() {
            if *quantity < 0 {
                let mut error = ValidationError::new("range");
                error.add_param("min".into(), &0);
                error.add_param("value".into(), quantity);
                errors.add("quantity", error);
            }
        }

        if let Some(price) = self.price.value() {
            if let Err(error) = validate_price(price) {
                errors.add("price", error);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn reject_null<T>(errors: &mut ValidationErrors, field: &'static str, patch: &Patch<T>) {
    if matches!(patch, Patch::Null) {
        errors.add(
            field,
            ValidationError::new("null").with_message(format!("{} cannot be null", field).into()),
        );
    }
}

/// Resolved field changes handed to the repository.
///
/// Built by the service from a validated [`UpdateProduct`]; `updated_at`
/// is always set.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductChanges {
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    pub status: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl ProductChanges {
    pub fn from_update(update: UpdateProduct, now: DateTime<Utc>) -> Self {
        Self {
            quantity: update.quantity.into_option(),
            price: update.price.into_option(),
            status: update.status.into_option(),
            updated_at: update
                .updated_at
                .into_option()
                .map(|t| t.trunc_subsecs(3))
                .unwrap_or(now),
        }
    }
}

/// Query filters for listing products. Both bounds are inclusive.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    /// Lowest price to include
    #[param(value_type = Option<String>, example = "10.00")]
    #[schema(value_type = Option<String>)]
    pub min_price: Option<Decimal>,

    /// Highest price to include
    #[param(value_type = Option<String>, example = "99.99")]
    #[schema(value_type = Option<String>)]
    pub max_price: Option<Decimal>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        self.min_price.is_none_or(|min| product.price >= min)
            && self.max_price.is_none_or(|max| product.price <= max)
    }
}

fn default_status() -> bool {
    true
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut error = ValidationError::new("range");
        error.add_param("min".into(), &0);
        return Err(error.with_message("price must not be negative".into()));
    }
    Ok(())
}

/// Current time at the millisecond precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

impl Product {
    /// Create a new product from CreateProduct DTO
    pub fn new(input: CreateProduct) -> Self {
        let now = now();
        Self {
            id: Uuid::now_v7(),
            name: input.name,
            quantity: input.quantity,
            price: input.price,
            status: input.status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply resolved changes; untouched fields keep their values.
    pub fn apply_changes(&mut self, changes: &ProductChanges) {
        if let Some(quantity) = changes.quantity {
            self.quantity = quantity;
        }
        if let Some(price) = changes.price {
            self.price = price;
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        self.updated_at = changes.updated_at;
    }
}
