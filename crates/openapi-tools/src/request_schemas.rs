//! Best-effort request body schemas for write operations whose declared schema is missing.
//!
//! The entity is guessed from the operation id. The result is always a permissive object, so a
//! wrong guess never rejects a body the upstream API would accept.

use crate::document::string_placeholder;
use openapiv3::Schema;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Contact,
    Invoice,
    Bill,
    Item,
    Expense,
    Estimate,
    SalesOrder,
    PurchaseOrder,
    Payment,
    Vendor,
}

impl Entity {
    /// Sniff the entity from an operation id. First match wins.
    #[must_use]
    pub fn from_operation_id(operation_id: &str) -> Option<Self> {
        let id = operation_id.to_ascii_lowercase();
        let has = |needle: &str| id.contains(needle);
        if has("contact") {
            Some(Self::Contact)
        } else if has("invoice") {
            Some(Self::Invoice)
        } else if has("bill") {
            Some(Self::Bill)
        } else if has("item") {
            Some(Self::Item)
        } else if has("expense") {
            Some(Self::Expense)
        } else if has("estimate") {
            Some(Self::Estimate)
        } else if has("sales_order") || has("salesorder") {
            Some(Self::SalesOrder)
        } else if has("purchase_order") || has("purchaseorder") {
            Some(Self::PurchaseOrder)
        } else if has("payment") {
            Some(Self::Payment)
        } else if has("vendor") {
            Some(Self::Vendor)
        } else {
            None
        }
    }
}

/// Build the request schema for `operation_id`.
#[must_use]
pub fn synthesize_request_schema(operation_id: &str, description: Option<&str>) -> Schema {
    let description = description
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request body for {operation_id}"));

    let (properties, required) = match Entity::from_operation_id(operation_id) {
        Some(Entity::Contact) => contact_fields(),
        Some(Entity::Invoice | Entity::Estimate | Entity::SalesOrder) => sales_document_fields(),
        Some(Entity::Bill | Entity::PurchaseOrder) => purchase_document_fields(),
        Some(Entity::Item) => item_fields(),
        Some(Entity::Expense) => expense_fields(),
        Some(Entity::Payment) => {
            payment_fields(operation_id.to_ascii_lowercase().contains("vendor"))
        }
        // Vendor-only operations (vendor credits and the like) get no field guesses.
        Some(Entity::Vendor) | None => (Map::new(), Vec::new()),
    };

    let mut schema = json!({
        "type": "object",
        "description": description,
        "additionalProperties": true,
    });
    if !properties.is_empty() {
        schema["properties"] = Value::Object(properties);
    }
    if !required.is_empty() {
        schema["required"] = json!(required);
    }

    serde_json::from_value(schema).unwrap_or_else(|e| {
        tracing::warn!(operation_id, error = %e, "synthesized schema rejected; using placeholder");
        string_placeholder()
    })
}

type Fields = (Map<String, Value>, Vec<&'static str>);

fn string() -> Value {
    json!({ "type": "string" })
}

fn number() -> Value {
    json!({ "type": "number" })
}

fn boolean() -> Value {
    json!({ "type": "boolean" })
}

fn date() -> Value {
    json!({ "type": "string", "format": "date" })
}

fn array_of(props: Value) -> Value {
    json!({
        "type": "array",
        "items": { "type": "object", "properties": props, "additionalProperties": true }
    })
}

fn custom_fields() -> Value {
    array_of(json!({ "label": string(), "value": string() }))
}

fn address() -> Value {
    json!({
        "type": "object",
        "properties": {
            "attention": string(),
            "address": string(),
            "city": string(),
            "state": string(),
            "zip": string(),
            "country": string(),
        },
        "additionalProperties": true,
    })
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn contact_fields() -> Fields {
    let props = json!({
        "contact_name": string(),
        "company_name": string(),
        "contact_type": { "type": "string", "enum": ["customer", "vendor", "both"] },
        "contact_persons": array_of(json!({
            "first_name": string(),
            "last_name": string(),
            "email": { "type": "string", "format": "email" },
            "phone": string(),
            "is_primary_contact": boolean(),
        })),
        "billing_address": address(),
        "shipping_address": address(),
        "currency_id": string(),
        "payment_terms": { "type": "integer" },
        "notes": string(),
        "custom_fields": custom_fields(),
    });
    (object(props), vec!["contact_name"])
}

fn sales_document_fields() -> Fields {
    let props = json!({
        "customer_id": string(),
        "date": date(),
        "due_date": date(),
        "reference_number": string(),
        "line_items": array_of(json!({
            "item_id": string(),
            "name": string(),
            "description": string(),
            "rate": number(),
            "quantity": number(),
            "discount": number(),
            "tax_id": string(),
        })),
        "notes": string(),
        "terms": string(),
        "custom_fields": custom_fields(),
    });
    (object(props), vec!["customer_id", "line_items"])
}

fn purchase_document_fields() -> Fields {
    let props = json!({
        "vendor_id": string(),
        "date": date(),
        "due_date": date(),
        "reference_number": string(),
        "line_items": array_of(json!({
            "item_id": string(),
            "name": string(),
            "description": string(),
            "rate": number(),
            "quantity": number(),
            "account_id": string(),
        })),
        "notes": string(),
        "custom_fields": custom_fields(),
    });
    (object(props), vec!["vendor_id", "line_items"])
}

fn item_fields() -> Fields {
    let props = json!({
        "name": string(),
        "rate": number(),
        "description": string(),
        "account_id": string(),
        "tax_id": string(),
        "unit": string(),
        "is_taxable": boolean(),
        "sku": string(),
    });
    (object(props), vec!["name"])
}

fn expense_fields() -> Fields {
    let props = json!({
        "account_id": string(),
        "date": date(),
        "amount": number(),
        "vendor_id": string(),
        "customer_id": string(),
        "currency_id": string(),
        "reference_number": string(),
        "description": string(),
        "is_billable": boolean(),
    });
    (object(props), vec!["account_id", "amount", "date"])
}

fn payment_fields(vendor: bool) -> Fields {
    let (party, documents, document_id) = if vendor {
        ("vendor_id", "bills", "bill_id")
    } else {
        ("customer_id", "invoices", "invoice_id")
    };
    let mut props = object(json!({
        "payment_mode": string(),
        "amount": number(),
        "date": date(),
        "reference_number": string(),
        "description": string(),
    }));
    props.insert(party.to_string(), string());
    let mut applied = Map::new();
    applied.insert(document_id.to_string(), string());
    applied.insert("amount_applied".to_string(), number());
    props.insert(documents.to_string(), array_of(Value::Object(applied)));
    (props, vec![party, "amount"])
}
