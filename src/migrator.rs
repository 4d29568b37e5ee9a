use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_items_table::Migration),
            Box::new(m20240101_000002_create_stock_entries_table::Migration),
            Box::new(m20240101_000003_create_item_prices_table::Migration),
            Box::new(m20240101_000004_create_item_price_history_table::Migration),
            Box::new(m20240101_000005_create_purchases_tables::Migration),
            Box::new(m20240101_000006_create_purchase_returns_tables::Migration),
            Box::new(m20240101_000007_create_sales_tables::Migration),
            Box::new(m20240101_000008_create_customer_returns_tables::Migration),
            Box::new(m20240101_000009_create_stock_adjustments_tables::Migration),
            Box::new(m20240101_000010_create_stock_transfers_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Items::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Items::Name).string().not_null())
                        .col(ColumnDef::new(Items::Sku).string().not_null().unique_key())
                        .col(ColumnDef::new(Items::CostingMethod).string().not_null())
                        .col(
                            ColumnDef::new(Items::OpeningQuantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Items::OpeningPrice)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Items::OpeningWarehouseId).integer().null())
                        .col(
                            ColumnDef::new(Items::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Items::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Items {
        Table,
        Id,
        Name,
        Sku,
        CostingMethod,
        OpeningQuantity,
        OpeningPrice,
        OpeningWarehouseId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_entries_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockEntries::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockEntries::ItemId).big_integer().not_null())
                        .col(ColumnDef::new(StockEntries::WarehouseId).integer().not_null())
                        .col(
                            ColumnDef::new(StockEntries::Quantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockEntries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_stock_entries_item_warehouse")
                        .table(StockEntries::Table)
                        .col(StockEntries::ItemId)
                        .col(StockEntries::WarehouseId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockEntries {
        Table,
        Id,
        ItemId,
        WarehouseId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_item_prices_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_item_prices_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ItemPrices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ItemPrices::ItemId)
                                .big_integer()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItemPrices::PriceUsd)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ItemPrices::EffectiveDate).date().not_null())
                        .col(
                            ColumnDef::new(ItemPrices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItemPrices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ItemPrices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ItemPrices {
        Table,
        ItemId,
        PriceUsd,
        EffectiveDate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_item_price_history_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_item_price_history_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ItemPriceHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ItemPriceHistory::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItemPriceHistory::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItemPriceHistory::OldPrice)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ItemPriceHistory::NewPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItemPriceHistory::SourceType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItemPriceHistory::SourceId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(ItemPriceHistory::Note).string().null())
                        .col(
                            ColumnDef::new(ItemPriceHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_item_price_history_item")
                        .table(ItemPriceHistory::Table)
                        .col(ItemPriceHistory::ItemId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ItemPriceHistory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ItemPriceHistory {
        Table,
        Id,
        ItemId,
        OldPrice,
        NewPrice,
        SourceType,
        SourceId,
        Note,
        CreatedAt,
    }
}

mod m20240101_000005_create_purchases_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_purchases_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Purchases::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Purchases::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Purchases::WarehouseId).integer().not_null())
                        .col(ColumnDef::new(Purchases::SupplierId).big_integer().null())
                        .col(ColumnDef::new(Purchases::DocDate).date().not_null())
                        .col(
                            ColumnDef::new(Purchases::Currency)
                                .string()
                                .not_null()
                                .default("USD"),
                        )
                        .col(ColumnDef::new(Purchases::Status).string().not_null())
                        .col(
                            ColumnDef::new(Purchases::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Purchases::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Purchases::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseLines::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseLines::PurchaseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseLines::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseLines::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseLines::UnitCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_lines_purchase_id")
                                .from(PurchaseLines::Table, PurchaseLines::PurchaseId)
                                .to(Purchases::Table, Purchases::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_purchase_lines_item")
                        .table(PurchaseLines::Table)
                        .col(PurchaseLines::ItemId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Purchases::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Purchases {
        Table,
        Id,
        WarehouseId,
        SupplierId,
        DocDate,
        Currency,
        Status,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseLines {
        Table,
        Id,
        PurchaseId,
        ItemId,
        Quantity,
        UnitCost,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000006_create_purchase_returns_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_purchase_returns_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseReturns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseReturns::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturns::PurchaseId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturns::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseReturns::DocDate).date().not_null())
                        .col(
                            ColumnDef::new(PurchaseReturns::Currency)
                                .string()
                                .not_null()
                                .default("USD"),
                        )
                        .col(ColumnDef::new(PurchaseReturns::Status).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseReturns::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseReturnLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseReturnLines::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturnLines::PurchaseReturnId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturnLines::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturnLines::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturnLines::UnitCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturnLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseReturnLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_return_lines_return_id")
                                .from(
                                    PurchaseReturnLines::Table,
                                    PurchaseReturnLines::PurchaseReturnId,
                                )
                                .to(PurchaseReturns::Table, PurchaseReturns::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_purchase_return_lines_item")
                        .table(PurchaseReturnLines::Table)
                        .col(PurchaseReturnLines::ItemId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseReturnLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseReturns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseReturns {
        Table,
        Id,
        PurchaseId,
        WarehouseId,
        DocDate,
        Currency,
        Status,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseReturnLines {
        Table,
        Id,
        PurchaseReturnId,
        ItemId,
        Quantity,
        UnitCost,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000007_create_sales_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Sales::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Sales::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Sales::WarehouseId).integer().not_null())
                        .col(ColumnDef::new(Sales::CustomerId).big_integer().null())
                        .col(ColumnDef::new(Sales::DocDate).date().not_null())
                        .col(
                            ColumnDef::new(Sales::Currency)
                                .string()
                                .not_null()
                                .default("USD"),
                        )
                        .col(ColumnDef::new(Sales::Status).string().not_null())
                        .col(
                            ColumnDef::new(Sales::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Sales::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sales::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SaleLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaleLines::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleLines::SaleId).big_integer().not_null())
                        .col(ColumnDef::new(SaleLines::ItemId).big_integer().not_null())
                        .col(
                            ColumnDef::new(SaleLines::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleLines::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_lines_sale_id")
                                .from(SaleLines::Table, SaleLines::SaleId)
                                .to(Sales::Table, Sales::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SaleLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sales::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Sales {
        Table,
        Id,
        WarehouseId,
        CustomerId,
        DocDate,
        Currency,
        Status,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum SaleLines {
        Table,
        Id,
        SaleId,
        ItemId,
        Quantity,
        UnitPrice,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000008_create_customer_returns_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000008_create_customer_returns_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CustomerReturns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomerReturns::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomerReturns::SaleId).big_integer().null())
                        .col(
                            ColumnDef::new(CustomerReturns::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomerReturns::DocDate).date().not_null())
                        .col(ColumnDef::new(CustomerReturns::Status).string().not_null())
                        .col(
                            ColumnDef::new(CustomerReturns::ApprovalStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturns::Received)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(CustomerReturns::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(CustomerReturns::ReceivedBy).string().null())
                        .col(
                            ColumnDef::new(CustomerReturns::ReceivedNote)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturns::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CustomerReturnLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomerReturnLines::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturnLines::CustomerReturnId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturnLines::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturnLines::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturnLines::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturnLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerReturnLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_customer_return_lines_return_id")
                                .from(
                                    CustomerReturnLines::Table,
                                    CustomerReturnLines::CustomerReturnId,
                                )
                                .to(CustomerReturns::Table, CustomerReturns::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CustomerReturnLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CustomerReturns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CustomerReturns {
        Table,
        Id,
        SaleId,
        WarehouseId,
        DocDate,
        Status,
        ApprovalStatus,
        Received,
        ReceivedAt,
        ReceivedBy,
        ReceivedNote,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum CustomerReturnLines {
        Table,
        Id,
        CustomerReturnId,
        ItemId,
        Quantity,
        UnitPrice,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000009_create_stock_adjustments_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000009_create_stock_adjustments_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockAdjustments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAdjustments::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustments::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustments::AdjustmentType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockAdjustments::Reason).string().null())
                        .col(ColumnDef::new(StockAdjustments::DocDate).date().not_null())
                        .col(ColumnDef::new(StockAdjustments::Status).string().not_null())
                        .col(
                            ColumnDef::new(StockAdjustments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockAdjustmentLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAdjustmentLines::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentLines::StockAdjustmentId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentLines::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentLines::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_adjustment_lines_adjustment_id")
                                .from(
                                    StockAdjustmentLines::Table,
                                    StockAdjustmentLines::StockAdjustmentId,
                                )
                                .to(StockAdjustments::Table, StockAdjustments::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockAdjustmentLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockAdjustments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockAdjustments {
        Table,
        Id,
        WarehouseId,
        AdjustmentType,
        Reason,
        DocDate,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum StockAdjustmentLines {
        Table,
        Id,
        StockAdjustmentId,
        ItemId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000010_create_stock_transfers_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000010_create_stock_transfers_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockTransfers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransfers::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::FromWarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::ToWarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransfers::DocDate).date().not_null())
                        .col(ColumnDef::new(StockTransfers::Status).string().not_null())
                        .col(ColumnDef::new(StockTransfers::Note).string().null())
                        .col(
                            ColumnDef::new(StockTransfers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockTransferLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransferLines::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransferLines::StockTransferId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransferLines::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransferLines::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransferLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransferLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_transfer_lines_transfer_id")
                                .from(
                                    StockTransferLines::Table,
                                    StockTransferLines::StockTransferId,
                                )
                                .to(StockTransfers::Table, StockTransfers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockTransferLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockTransfers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockTransfers {
        Table,
        Id,
        FromWarehouseId,
        ToWarehouseId,
        DocDate,
        Status,
        Note,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum StockTransferLines {
        Table,
        Id,
        StockTransferId,
        ItemId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}
