//! Input validation for decoded orders
//!
//! Field-level structural and semantic rules. Validation is pure: it never
//! touches the store or the cache, and a failure lists every violated field
//! so the DLQ entry is diagnosable in one look.

use regex::Regex;
use uuid::Uuid;

use crate::models::Order;

/// A single violated rule, addressed by field path (`delivery.phone`,
/// `items[2].chrt_id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All violations found in one pass over the order.
#[derive(Debug)]
pub struct FieldErrors(pub Vec<FieldError>);

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "validation failed: {}", parts.join("; "))
    }
}

impl std::error::Error for FieldErrors {}

/// Order validator with pre-compiled field patterns.
///
/// Construction is the single fallible path: pattern compilation either
/// succeeds here or the process aborts at startup. There is deliberately
/// no panicking constructor.
#[derive(Debug, Clone)]
pub struct Validator {
    phone: Regex,
    zip: Regex,
    email: Regex,
}

impl Validator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            phone: Regex::new(r"^(\+7|8)\d{10}$")?,
            zip: Regex::new(r"^\d{6}$")?,
            email: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")?,
        })
    }

    /// Check every rule and collect all violations.
    pub fn validate(&self, order: &Order) -> Result<(), FieldErrors> {
        let mut errors = Vec::new();

        if Uuid::parse_str(&order.order_uid).is_err() {
            push(&mut errors, "order_uid", "must be a valid UUID");
        }
        required(&mut errors, "track_number", &order.track_number);
        required(&mut errors, "entry", &order.entry);
        required(&mut errors, "locale", &order.locale);
        required(&mut errors, "customer_id", &order.customer_id);
        required(&mut errors, "delivery_service", &order.delivery_service);
        required(&mut errors, "shardkey", &order.shard_key);
        required(&mut errors, "oof_shard", &order.oof_shard);

        let d = &order.delivery;
        required(&mut errors, "delivery.name", &d.name);
        required(&mut errors, "delivery.city", &d.city);
        required(&mut errors, "delivery.address", &d.address);
        required(&mut errors, "delivery.region", &d.region);
        if !self.phone.is_match(&d.phone) {
            push(&mut errors, "delivery.phone", "must match ^(\\+7|8)\\d{10}$");
        }
        if !self.zip.is_match(&d.zip) {
            push(&mut errors, "delivery.zip", "must be a 6-digit zip code");
        }
        if !self.email.is_match(&d.email) {
            push(&mut errors, "delivery.email", "must be a valid email address");
        }

        let p = &order.payment;
        required(&mut errors, "payment.transaction", &p.transaction);
        required(&mut errors, "payment.currency", &p.currency);
        required(&mut errors, "payment.provider", &p.provider);
        required(&mut errors, "payment.bank", &p.bank);
        non_negative(&mut errors, "payment.amount", p.amount);
        non_negative(&mut errors, "payment.delivery_cost", p.delivery_cost);
        non_negative(&mut errors, "payment.goods_total", p.goods_total);
        non_negative(&mut errors, "payment.custom_fee", p.custom_fee);
        if p.payment_dt <= 0 {
            push(&mut errors, "payment.payment_dt", "must be a positive unix timestamp");
        }

        for (i, item) in order.items.iter().enumerate() {
            positive(&mut errors, &format!("items[{i}].chrt_id"), item.chrt_id);
            positive(&mut errors, &format!("items[{i}].nm_id"), item.nm_id);
            non_negative(&mut errors, &format!("items[{i}].price"), item.price);
            non_negative(&mut errors, &format!("items[{i}].sale"), item.sale);
            non_negative(&mut errors, &format!("items[{i}].total_price"), item.total_price);
            non_negative(&mut errors, &format!("items[{i}].status"), item.status);
            required(&mut errors, &format!("items[{i}].track_number"), &item.track_number);
            required(&mut errors, &format!("items[{i}].rid"), &item.rid);
            required(&mut errors, &format!("items[{i}].name"), &item.name);
            required(&mut errors, &format!("items[{i}].size"), &item.size);
            required(&mut errors, &format!("items[{i}].brand"), &item.brand);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FieldErrors(errors))
        }
    }
}

fn push(errors: &mut Vec<FieldError>, field: &str, message: &str) {
    errors.push(FieldError {
        field: field.to_string(),
        message: message.to_string(),
    });
}

fn required(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        push(errors, field, "must not be empty");
    }
}

fn non_negative(errors: &mut Vec<FieldError>, field: &str, value: i64) {
    if value < 0 {
        push(errors, field, "must not be negative");
    }
}

fn positive(errors: &mut Vec<FieldError>, field: &str, value: i64) {
    if value <= 0 {
        push(errors, field, "must be greater than zero");
    }
}
