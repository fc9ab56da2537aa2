use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250201_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Authors::Table)
                    .if_not_exists()
                    .col(pk_auto(Authors::Id))
                    .col(string_len(Authors::FirstName, 100))
                    .col(string_len_null(Authors::LastName, 100))
                    .col(string(Authors::DateOfBirth))
                    .col(string_null(Authors::DateOfDeath))
                    .col(integer_null(Authors::OwnerId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_authors_owner")
                            .from(Authors::Table, Authors::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genres::Table)
                    .if_not_exists()
                    .col(pk_auto(Genres::Id))
                    .col(string_len(Genres::Name, 200))
                    .col(integer_null(Genres::OwnerId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_genres_owner")
                            .from(Genres::Table, Genres::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Books::Table)
                    .if_not_exists()
                    .col(pk_auto(Books::Id))
                    .col(string_len(Books::Title, 200))
                    .col(integer_null(Books::AuthorId))
                    .col(string_len(Books::ShortDescription, 1000))
                    .col(string_len_null(Books::Isbn, 20))
                    .col(integer_null(Books::OwnerId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_books_author")
                            .from(Books::Table, Books::AuthorId)
                            .to(Authors::Table, Authors::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_books_owner")
                            .from(Books::Table, Books::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BookGenres::Table)
                    .if_not_exists()
                    .col(integer(BookGenres::BookId))
                    .col(integer(BookGenres::GenreId))
                    .primary_key(Index::create().col(BookGenres::BookId).col(BookGenres::GenreId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_book_genres_book")
                            .from(BookGenres::Table, BookGenres::BookId)
                            .to(Books::Table, Books::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_book_genres_genre")
                            .from(BookGenres::Table, BookGenres::GenreId)
                            .to(Genres::Table, Genres::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(BookGenres::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Books::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Genres::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Authors::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Authors {
    Table,
    Id,
    FirstName,
    LastName,
    DateOfBirth,
    DateOfDeath,
    OwnerId,
}

#[derive(DeriveIden)]
enum Genres {
    Table,
    Id,
    Name,
    OwnerId,
}

#[derive(DeriveIden)]
enum Books {
    Table,
    Id,
    Title,
    AuthorId,
    ShortDescription,
    Isbn,
    OwnerId,
}

#[derive(DeriveIden)]
enum BookGenres {
    Table,
    BookId,
    GenreId,
}
