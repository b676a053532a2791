use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Categories::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Categories::Name)
                            .string_len(256)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Categories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Books::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Books::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Books::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Books::Author).string_len(256).not_null())
                    .col(ColumnDef::new(Books::Description).string_len(4000).null())
                    .col(
                        ColumnDef::new(Books::Price)
                            .decimal_len(10, 2)
                            .not_null()
                            .check(Expr::col(Books::Price).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Books::Stock)
                            .integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Books::Stock).gte(0)),
                    )
                    .col(ColumnDef::new(Books::CategoryId).uuid().not_null())
                    .col(ColumnDef::new(Books::ImageUrl).string_len(512).not_null())
                    .col(
                        ColumnDef::new(Books::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_books_category")
                            .from(Books::Table, Books::CategoryId)
                            .to(Categories::Table, Categories::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_books_category")
                    .table(Books::Table)
                    .col(Books::CategoryId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Books::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Books {
    Table,
    Id,
    Title,
    Author,
    Description,
    Price,
    Stock,
    CategoryId,
    ImageUrl,
    CreatedAt,
}
