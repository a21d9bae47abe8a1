//! Response bodies of the statistics endpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalOrders {
    #[serde(rename = "totalOrders")]
    pub total_orders: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub delivery_status: String,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalCustomers {
    #[serde(rename = "totalCustomers")]
    pub total_customers: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesToday {
    #[serde(rename = "totalSalesToday")]
    pub total_sales_today: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySales {
    #[serde(rename = "totalSalesThisMonth")]
    pub total_sales_this_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlySales {
    #[serde(rename = "totalSalesThisYear")]
    pub total_sales_this_year: f64,
}

/// Sales total of one calendar month of the current year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTotal {
    pub month: u32,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySales {
    pub category: String,
    #[serde(rename = "totalSales")]
    pub total_sales: f64,
}
