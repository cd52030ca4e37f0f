use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_collaborator_tables::Migration),
            Box::new(m20260101_000002_create_textbook_orders_table::Migration),
            Box::new(m20260101_000003_create_link_suggestions_table::Migration),
            Box::new(m20260101_000004_create_order_subitems_table::Migration),
        ]
    }
}

mod m20260101_000001_create_collaborator_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_collaborator_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CatalogBooks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CatalogBooks::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(CatalogBooks::Code).string().not_null())
                        .col(ColumnDef::new(CatalogBooks::Name).string().not_null())
                        .col(
                            ColumnDef::new(CatalogBooks::Price)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CatalogBooks::Grade).string().null())
                        .col(ColumnDef::new(CatalogBooks::Grades).json().not_null())
                        .col(
                            ColumnDef::new(CatalogBooks::InventoryQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CatalogBooks::ReservedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CatalogBooks::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(CatalogBooks::RestrictedCatalog)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_catalog_books_code")
                        .table(CatalogBooks::Table)
                        .col(CatalogBooks::Code)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StudentEnrollments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StudentEnrollments::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StudentEnrollments::StudentId).uuid().not_null())
                        .col(ColumnDef::new(StudentEnrollments::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(StudentEnrollments::StudentName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StudentEnrollments::Grade).string().not_null())
                        .col(
                            ColumnDef::new(StudentEnrollments::SchoolYear)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StudentEnrollments::Status).string().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_student_enrollments_student_year")
                        .table(StudentEnrollments::Table)
                        .col(StudentEnrollments::StudentId)
                        .col(StudentEnrollments::SchoolYear)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AppUsers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AppUsers::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(AppUsers::DisplayName).string().not_null())
                        .col(ColumnDef::new(AppUsers::Email).string().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AppUsers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StudentEnrollments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CatalogBooks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CatalogBooks {
        Table,
        Id,
        Code,
        Name,
        Price,
        Grade,
        Grades,
        InventoryQuantity,
        ReservedQuantity,
        Active,
        RestrictedCatalog,
    }

    #[derive(DeriveIden)]
    enum StudentEnrollments {
        Table,
        Id,
        StudentId,
        UserId,
        StudentName,
        Grade,
        SchoolYear,
        Status,
    }

    #[derive(DeriveIden)]
    enum AppUsers {
        Table,
        Id,
        DisplayName,
        Email,
    }
}

mod m20260101_000002_create_textbook_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000002_create_textbook_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TextbookOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TextbookOrders::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(TextbookOrders::UserId).uuid().null())
                        .col(ColumnDef::new(TextbookOrders::StudentId).uuid().null())
                        .col(ColumnDef::new(TextbookOrders::SchoolYear).integer().not_null())
                        .col(ColumnDef::new(TextbookOrders::Status).string().not_null())
                        .col(ColumnDef::new(TextbookOrders::LinkStatus).string().null())
                        .col(
                            ColumnDef::new(TextbookOrders::SourceBoardItemId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(TextbookOrders::LiveKey).string().null())
                        .col(ColumnDef::new(TextbookOrders::Document).json().not_null())
                        .col(
                            ColumnDef::new(TextbookOrders::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(TextbookOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TextbookOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_textbook_orders_student_year")
                        .table(TextbookOrders::Table)
                        .col(TextbookOrders::StudentId)
                        .col(TextbookOrders::SchoolYear)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_textbook_orders_user_id")
                        .table(TextbookOrders::Table)
                        .col(TextbookOrders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_textbook_orders_link_status")
                        .table(TextbookOrders::Table)
                        .col(TextbookOrders::LinkStatus)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_textbook_orders_source_board_item")
                        .table(TextbookOrders::Table)
                        .col(TextbookOrders::SourceBoardItemId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // One live order per student and year; cancelled rows carry NULL.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_textbook_orders_live_key")
                        .table(TextbookOrders::Table)
                        .col(TextbookOrders::LiveKey)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TextbookOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum TextbookOrders {
        Table,
        Id,
        UserId,
        StudentId,
        SchoolYear,
        Status,
        LinkStatus,
        SourceBoardItemId,
        LiveKey,
        Document,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000003_create_link_suggestions_table {

    use super::m20260101_000002_create_textbook_orders_table::TextbookOrders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000003_create_link_suggestions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LinkSuggestions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LinkSuggestions::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(LinkSuggestions::OrderId).uuid().not_null())
                        .col(ColumnDef::new(LinkSuggestions::StudentId).uuid().not_null())
                        .col(ColumnDef::new(LinkSuggestions::UserId).uuid().not_null())
                        .col(ColumnDef::new(LinkSuggestions::StudentName).string().not_null())
                        .col(
                            ColumnDef::new(LinkSuggestions::BoardStudentName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LinkSuggestions::Score).double().not_null())
                        .col(ColumnDef::new(LinkSuggestions::Status).string().not_null())
                        .col(
                            ColumnDef::new(LinkSuggestions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LinkSuggestions::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(LinkSuggestions::ResolvedBy).uuid().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_link_suggestions_order")
                                .from(LinkSuggestions::Table, LinkSuggestions::OrderId)
                                .to(TextbookOrders::Table, TextbookOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_link_suggestions_status")
                        .table(LinkSuggestions::Table)
                        .col(LinkSuggestions::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LinkSuggestions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum LinkSuggestions {
        Table,
        Id,
        OrderId,
        StudentId,
        UserId,
        StudentName,
        BoardStudentName,
        Score,
        Status,
        CreatedAt,
        ResolvedAt,
        ResolvedBy,
    }
}

mod m20260101_000004_create_order_subitems_table {

    use super::m20260101_000002_create_textbook_orders_table::TextbookOrders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000004_create_order_subitems_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderSubitems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderSubitems::SubitemId)
                                .string()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderSubitems::OrderId).uuid().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_subitems_order")
                                .from(OrderSubitems::Table, OrderSubitems::OrderId)
                                .to(TextbookOrders::Table, TextbookOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_subitems_order_id")
                        .table(OrderSubitems::Table)
                        .col(OrderSubitems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderSubitems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderSubitems {
        Table,
        SubitemId,
        OrderId,
    }
}
