//! The shopper's current order.
//!
//! Every cart and checkout request works against one order: the incomplete
//! order matching the request's store, currency, guest token and user, or
//! failing that the user's most recent incomplete order in the store.
//! [`CurrentOrder`] resolves that order once per request and carries the
//! session-level rules around it: creating it on first add-to-cart, tying it
//! to a user after login and folding the user's other carts into it.

use std::future::Future;
use std::net::IpAddr;

use parcel_core::{Currency, NewOrder, Order, OrderId, StoreId, UserId};

use crate::db::RepositoryError;
use crate::models::CurrentUser;

/// Attributes an order must match to be the current order.
///
/// An absent `user_id` matches only orders without a user, and an absent
/// guest token only orders without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderParams {
    pub currency: Currency,
    pub guest_token: Option<String>,
    pub store_id: StoreId,
    pub user_id: Option<UserId>,
}

/// Per-request facts the current order is resolved from.
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub store_id: StoreId,
    pub currency: Currency,
    pub guest_token: Option<String>,
    pub user: Option<CurrentUser>,
    pub ip: IpAddr,
}

/// Persistence the current-order rules need.
///
/// "Incomplete" means `completed_at` is unset.
pub trait OrderStore: Send + Sync {
    /// The incomplete order matching `params` exactly, most recent first.
    fn find_incomplete(
        &self,
        params: &OrderParams,
    ) -> impl Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// All of a user's incomplete orders in a store, most recent first.
    fn incomplete_for_user(
        &self,
        user_id: UserId,
        store_id: StoreId,
    ) -> impl Future<Output = Result<Vec<Order>, RepositoryError>> + Send;

    /// Persist a new order.
    fn create(&self, new: NewOrder) -> impl Future<Output = Result<Order, RepositoryError>> + Send;

    /// Persist an order's user, email and creator.
    fn save_user(&self, order: &Order) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Fold `other` into `into`, delete `other` and return the merged order.
    ///
    /// When `user` is given the merged order is assigned to that user.
    fn merge(
        &self,
        into: OrderId,
        other: OrderId,
        user: Option<UserId>,
    ) -> impl Future<Output = Result<Order, RepositoryError>> + Send;

    /// Persist the address the order was last touched from.
    fn record_ip(
        &self,
        order_id: OrderId,
        ip: IpAddr,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Resolves and memoizes the current order for one request.
pub struct CurrentOrder<'a, S> {
    store: &'a S,
    ctx: OrderContext,
    order: Option<Order>,
}

impl<'a, S: OrderStore> CurrentOrder<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, ctx: OrderContext) -> Self {
        Self {
            store,
            ctx,
            order: None,
        }
    }

    /// The currency orders are created and looked up in.
    #[must_use]
    pub const fn current_currency(&self) -> Currency {
        self.ctx.currency
    }

    /// The client address of the request.
    #[must_use]
    pub const fn ip_address(&self) -> IpAddr {
        self.ctx.ip
    }

    #[must_use]
    pub const fn user(&self) -> Option<&CurrentUser> {
        self.ctx.user.as_ref()
    }

    /// What the current order must match.
    #[must_use]
    pub fn params(&self) -> OrderParams {
        OrderParams {
            currency: self.ctx.currency,
            guest_token: self.ctx.guest_token.clone(),
            store_id: self.ctx.store_id,
            user_id: self.ctx.user.as_ref().map(|u| u.id),
        }
    }

    /// Switch to a freshly logged-in user, keeping an already resolved order
    /// so the guest cart can be handed over to the account.
    pub fn adopt_user(&mut self, user: CurrentUser) {
        self.ctx.user = Some(user);
    }

    /// Replace the memoized order, e.g. after the caller modified and saved it.
    pub fn replace(&mut self, order: Order) {
        self.order = Some(order);
    }

    /// The current order for read-only views.
    ///
    /// Never creates or saves anything. Without a matching order this is an
    /// unsaved empty order, so item counts read as zero.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup fails.
    pub async fn simple_current_order(&mut self) -> Result<Order, RepositoryError> {
        let found = match &self.order {
            Some(order) => Some(order.clone()),
            None => self.find_order_by_token_or_user().await?,
        };

        match found {
            Some(order) => {
                self.order = Some(order.clone());
                Ok(Order {
                    last_ip_address: Some(self.ctx.ip),
                    ..order
                })
            }
            None => Ok(Order::empty(self.ctx.currency)),
        }
    }

    /// The current order, optionally creating it.
    ///
    /// With `create_order_if_necessary`, a new order is persisted when none
    /// was found or the one found has already completed checkout. The
    /// returned order has its last IP address recorded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a lookup or write fails.
    pub async fn current_order(
        &mut self,
        create_order_if_necessary: bool,
    ) -> Result<Option<Order>, RepositoryError> {
        let memoized = self
            .order
            .as_ref()
            .is_some_and(|order| order.is_persisted() && !order.is_completed());
        let mut order = if memoized {
            self.order.clone()
        } else {
            self.find_order_by_token_or_user().await?
        };

        if create_order_if_necessary && order.as_ref().is_none_or(Order::is_completed) {
            let created = self
                .store
                .create(NewOrder {
                    currency: self.ctx.currency,
                    guest_token: self.ctx.guest_token.clone(),
                    store_id: self.ctx.store_id,
                    user_id: self.ctx.user.as_ref().map(|u| u.id),
                    email: self.ctx.user.as_ref().map(|u| u.email.clone()),
                })
                .await?;
            tracing::info!(
                order_id = ?created.id,
                number = %created.number,
                store_id = %self.ctx.store_id,
                "Created order"
            );
            order = Some(created);
        }

        let Some(mut order) = order else {
            return Ok(None);
        };

        if let Some(id) = order.id
            && order.last_ip_address != Some(self.ctx.ip)
        {
            self.store.record_ip(id, self.ctx.ip).await?;
        }
        order.last_ip_address = Some(self.ctx.ip);

        self.order = Some(order.clone());
        Ok(Some(order))
    }

    /// Tie the current order to the logged-in user.
    ///
    /// Only orders without a user, or without an email, are touched. Returns
    /// whether the order was associated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup or write fails.
    pub async fn associate_user(&mut self) -> Result<bool, RepositoryError> {
        let Some(user) = self.ctx.user.clone() else {
            return Ok(false);
        };
        let Some(mut order) = self.current_order(false).await? else {
            return Ok(false);
        };
        if !order.needs_user_association() {
            return Ok(false);
        }

        order.associate_user(user.id, Some(user.email));
        self.store.save_user(&order).await?;
        tracing::info!(order_id = ?order.id, user_id = %user.id, "Associated order with user");

        self.order = Some(order);
        Ok(true)
    }

    /// Fold the user's other incomplete orders in this store into the
    /// current order.
    ///
    /// Orders in another currency are left alone. Returns the number of
    /// orders merged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a lookup or merge fails.
    pub async fn set_current_order(&mut self) -> Result<usize, RepositoryError> {
        let Some(user_id) = self.ctx.user.as_ref().map(|u| u.id) else {
            return Ok(0);
        };
        let Some(current) = self.current_order(false).await? else {
            return Ok(0);
        };
        let Some(current_id) = current.id else {
            return Ok(0);
        };

        let others = self
            .store
            .incomplete_for_user(user_id, self.ctx.store_id)
            .await?;

        let mut merged = current;
        let mut count = 0;
        for other in others {
            let Some(other_id) = other.id else { continue };
            if other_id == current_id {
                continue;
            }
            if other.currency != merged.currency {
                tracing::debug!(
                    order_id = %other_id,
                    currency = %other.currency,
                    "Skipping merge of order in another currency"
                );
                continue;
            }
            merged = self.store.merge(current_id, other_id, Some(user_id)).await?;
            count += 1;
            tracing::info!(into = %current_id, merged = %other_id, "Merged order");
        }

        merged.last_ip_address = Some(self.ctx.ip);
        self.order = Some(merged);
        Ok(count)
    }

    async fn find_order_by_token_or_user(&self) -> Result<Option<Order>, RepositoryError> {
        if let Some(order) = self.store.find_incomplete(&self.params()).await? {
            return Ok(Some(order));
        }

        match &self.ctx.user {
            Some(user) => Ok(self
                .store
                .incomplete_for_user(user.id, self.ctx.store_id)
                .await?
                .into_iter()
                .next()),
            None => Ok(None),
        }
    }
}
