pub mod customer_return;
pub mod customer_return_line;
pub mod item;
pub mod item_price;
pub mod item_price_history;
pub mod purchase;
pub mod purchase_line;
pub mod purchase_return;
pub mod purchase_return_line;
pub mod sale;
pub mod sale_line;
pub mod stock_adjustment;
pub mod stock_adjustment_line;
pub mod stock_entry;
pub mod stock_transfer;
pub mod stock_transfer_line;
