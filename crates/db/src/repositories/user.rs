//! User repository for database operations.
//!
//! Users are provisioned by the session layer; this repository covers what
//! the wallet needs: lookup, creation for seeding, and linked bank accounts.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};

use rampart_shared::types::{Currency, UserId};

use crate::entities::{linked_bank_accounts, users};

/// User repository for CRUD operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    /// Creates a new user repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds a user by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<users::Model>, DbErr> {
        users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await
    }

    /// Finds a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: UserId) -> Result<Option<users::Model>, DbErr> {
        users::Entity::find_by_id(id.into_inner()).one(&self.db).await
    }

    /// Creates a new user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn create(&self, email: &str, full_name: &str) -> Result<users::Model, DbErr> {
        let now = Utc::now().into();
        let user = users::ActiveModel {
            id: Set(UserId::new().into_inner()),
            email: Set(email.to_string()),
            full_name: Set(full_name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        user.insert(&self.db).await
    }

    /// Checks if an email already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn email_exists(&self, email: &str) -> Result<bool, DbErr> {
        let count = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Links an external bank account holding `amount` minor units.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn create_linked_account(
        &self,
        user_id: UserId,
        bank_name: &str,
        account_last4: &str,
        currency: Currency,
        amount: i64,
    ) -> Result<linked_bank_accounts::Model, DbErr> {
        let now = Utc::now().into();
        linked_bank_accounts::ActiveModel {
            user_id: Set(user_id.into_inner()),
            bank_name: Set(bank_name.to_string()),
            account_last4: Set(account_last4.to_string()),
            currency: Set(currency.as_str().to_string()),
            amount: Set(amount),
            locked: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
    }

    /// Lists a user's linked bank accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn linked_accounts(
        &self,
        user_id: UserId,
    ) -> Result<Vec<linked_bank_accounts::Model>, DbErr> {
        linked_bank_accounts::Entity::find()
            .filter(linked_bank_accounts::Column::UserId.eq(user_id.into_inner()))
            .order_by_asc(linked_bank_accounts::Column::Id)
            .all(&self.db)
            .await
    }
}
