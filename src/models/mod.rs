use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of listings a source publishes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Car,
    RealEstate,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Car => "car",
            Category::RealEstate => "real_estate",
        }
    }

    /// Human label used when a page carries no title of its own
    pub fn label(&self) -> &'static str {
        match self {
            Category::Car => "Car",
            Category::RealEstate => "Real estate",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "car" => Ok(Category::Car),
            "real_estate" => Ok(Category::RealEstate),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Petrol,
    Diesel,
    Hybrid,
    Electric,
    Other,
}

impl FuelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuelType::Petrol => "petrol",
            FuelType::Diesel => "diesel",
            FuelType::Hybrid => "hybrid",
            FuelType::Electric => "electric",
            FuelType::Other => "other",
        }
    }
}

impl FromStr for FuelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "petrol" => Ok(FuelType::Petrol),
            "diesel" => Ok(FuelType::Diesel),
            "hybrid" => Ok(FuelType::Hybrid),
            "electric" => Ok(FuelType::Electric),
            "other" => Ok(FuelType::Other),
            other => Err(format!("unknown fuel type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    House,
    Room,
    Commercial,
    Land,
    Other,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::House => "house",
            PropertyType::Room => "room",
            PropertyType::Commercial => "commercial",
            PropertyType::Land => "land",
            PropertyType::Other => "other",
        }
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apartment" => Ok(PropertyType::Apartment),
            "house" => Ok(PropertyType::House),
            "room" => Ok(PropertyType::Room),
            "commercial" => Ok(PropertyType::Commercial),
            "land" => Ok(PropertyType::Land),
            "other" => Ok(PropertyType::Other),
            other => Err(format!("unknown property type '{other}'")),
        }
    }
}

/// A named origin of listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub category: Category,
    pub base_url: String,
    pub is_active: bool,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Field mapping extracted from one detail page, before any typing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawListing {
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub location: String,
    /// Digits of the price cell with currency and separators stripped
    pub price: Option<String>,
    /// Absolute or page-relative image references in gallery order
    pub images: Vec<String>,
    pub year: Option<String>,
    pub mileage: Option<String>,
    pub fuel_type: Option<String>,
    pub rooms: Option<String>,
    pub area: Option<String>,
    pub property_type: Option<String>,
}

/// Typed record ready for the upsert step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedListing {
    pub external_id: String,
    pub category: Category,
    pub url: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price: Option<Decimal>,
    pub images: Vec<String>,
    pub year: Option<i32>,
    pub mileage: Option<i64>,
    pub fuel_type: Option<FuelType>,
    pub car_category: Option<String>,
    pub rooms: Option<i32>,
    pub area: Option<Decimal>,
    pub property_type: Option<PropertyType>,
}

/// Persisted marketplace item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub external_id: String,
    pub category: Category,
    pub source_id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Option<Decimal>,
    pub location: String,
    pub images: Vec<String>,
    pub url: String,
    pub year: Option<i32>,
    pub mileage: Option<i64>,
    pub fuel_type: Option<FuelType>,
    pub car_category: Option<String>,
    pub rooms: Option<i32>,
    pub area: Option<Decimal>,
    pub property_type: Option<PropertyType>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
}
