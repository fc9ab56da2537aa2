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
                    .table(Films::Table)
                    .if_not_exists()
                    .col(pk_auto(Films::Id))
                    .col(integer_null(Films::KinopoiskId).unique_key())
                    .col(string_len_null(Films::Name, 255))
                    .col(integer_null(Films::Year))
                    .col(big_integer(Films::UpdatedAt))
                    .col(integer_null(Films::OwnerId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_films_owner")
                            .from(Films::Table, Films::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Actors::Table)
                    .if_not_exists()
                    .col(pk_auto(Actors::Id))
                    .col(integer_null(Actors::StaffId).unique_key())
                    .col(string_len_null(Actors::Name, 255))
                    .col(string_len_null(Actors::PosterUrl, 500))
                    .col(string_len_null(Actors::Profession, 255))
                    .col(big_integer(Actors::UpdatedAt))
                    .col(integer_null(Actors::OwnerId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_actors_owner")
                            .from(Actors::Table, Actors::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FilmActors::Table)
                    .if_not_exists()
                    .col(integer(FilmActors::FilmId))
                    .col(integer(FilmActors::ActorId))
                    .primary_key(Index::create().col(FilmActors::FilmId).col(FilmActors::ActorId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_actors_film")
                            .from(FilmActors::Table, FilmActors::FilmId)
                            .to(Films::Table, Films::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_actors_actor")
                            .from(FilmActors::Table, FilmActors::ActorId)
                            .to(Actors::Table, Actors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_actors_actor")
                    .table(FilmActors::Table)
                    .col(FilmActors::ActorId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(FilmActors::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Actors::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Films::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Films {
    Table,
    Id,
    KinopoiskId,
    Name,
    Year,
    UpdatedAt,
    OwnerId,
}

#[derive(DeriveIden)]
enum Actors {
    Table,
    Id,
    StaffId,
    Name,
    PosterUrl,
    Profession,
    UpdatedAt,
    OwnerId,
}

#[derive(DeriveIden)]
enum FilmActors {
    Table,
    FilmId,
    ActorId,
}
