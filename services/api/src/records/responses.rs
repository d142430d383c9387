use serde::Serialize;

use booksync_db::records::models::{Customer, Invoice};

#[derive(Debug, Serialize)]
pub struct CustomerListResponse {
    pub data: Vec<Customer>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub data: Vec<Invoice>,
    pub count: usize,
}
