//! JSON server exposing sessions over HTTP. Every backtest is a session over one of the datasets
//! loaded at startup, and the server keeps only the latest session for each backtest.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use derive_more::{Display, Error};
use log::info;
use serde::{Deserialize, Serialize};

use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::exchange::orders::{Order, OrderOutcome};
use crate::exchange::session::ExchangeSession;
use crate::input::candles::CandleStore;

pub type BacktestId = u64;

pub struct BacktestState {
    pub id: BacktestId,
    pub session: ExchangeSession,
    pub dataset_name: String,
}

pub struct AppState {
    pub backtests: HashMap<BacktestId, BacktestState>,
    pub last: BacktestId,
    pub datasets: HashMap<String, Arc<CandleStore>>,
    pub config: ExchangeConfig,
}

impl AppState {
    pub fn create(datasets: HashMap<String, Arc<CandleStore>>, config: ExchangeConfig) -> Self {
        Self {
            backtests: HashMap::new(),
            last: 0,
            datasets,
            config,
        }
    }

    /// Server over one dataset with a backtest already running as id 0.
    pub fn single(
        name: &str,
        data: CandleStore,
        config: ExchangeConfig,
    ) -> Result<Self, ServerError> {
        let data = Arc::new(data);
        let session = ExchangeSession::from_config(Arc::clone(&data), &config)?;
        let backtest = BacktestState {
            id: 0,
            session,
            dataset_name: name.into(),
        };

        let mut datasets = HashMap::new();
        datasets.insert(name.into(), data);

        let mut backtests = HashMap::new();
        backtests.insert(0, backtest);

        Ok(Self {
            backtests,
            last: 0,
            datasets,
            config,
        })
    }

    pub fn init(&mut self, dataset_name: String) -> Result<BacktestId, ServerError> {
        let dataset = self
            .datasets
            .get(&dataset_name)
            .ok_or_else(|| ServerError::UnknownDataset {
                dataset: dataset_name.clone(),
            })?;
        let session = ExchangeSession::from_config(Arc::clone(dataset), &self.config)?;

        let new_id = self.last + 1;
        info!("SERVER: Starting backtest {:?} on {:?}", new_id, dataset_name);
        self.backtests.insert(
            new_id,
            BacktestState {
                id: new_id,
                session,
                dataset_name,
            },
        );
        self.last = new_id;
        Ok(new_id)
    }

    fn backtest(&self, backtest_id: BacktestId) -> Result<&BacktestState, ServerError> {
        self.backtests
            .get(&backtest_id)
            .ok_or(ServerError::UnknownBacktest { backtest_id })
    }

    fn backtest_mut(&mut self, backtest_id: BacktestId) -> Result<&mut BacktestState, ServerError> {
        self.backtests
            .get_mut(&backtest_id)
            .ok_or(ServerError::UnknownBacktest { backtest_id })
    }

    pub fn state(&self, backtest_id: BacktestId) -> Result<StateResponse, ServerError> {
        Ok(StateResponse::from(&self.backtest(backtest_id)?.session))
    }

    pub fn advance(&mut self, backtest_id: BacktestId) -> Result<StateResponse, ServerError> {
        let backtest = self.backtest_mut(backtest_id)?;
        backtest.session = backtest.session.advance()?;
        Ok(StateResponse::from(&backtest.session))
    }

    pub fn execute(
        &mut self,
        backtest_id: BacktestId,
        order: &Order,
    ) -> Result<OrderResponse, ServerError> {
        let backtest = self.backtest_mut(backtest_id)?;
        let (session, outcome) = backtest.session.execute(order)?;
        backtest.session = session;
        Ok(OrderResponse {
            outcome,
            state: StateResponse::from(&backtest.session),
        })
    }

    pub fn rebalance(
        &mut self,
        backtest_id: BacktestId,
        target: &BTreeMap<String, f64>,
    ) -> Result<StateResponse, ServerError> {
        let backtest = self.backtest_mut(backtest_id)?;
        backtest.session = backtest.session.rebalance_to(target)?;
        Ok(StateResponse::from(&backtest.session))
    }
}

/// Everything a client sees of a session. `portfolio` is missing when the balance is worth
/// nothing.
#[derive(Debug, Deserialize, Serialize)]
pub struct StateResponse {
    pub date: i64,
    pub has_next: bool,
    pub prices: BTreeMap<String, f64>,
    pub balance: BTreeMap<String, f64>,
    pub capital: f64,
    pub portfolio: Option<BTreeMap<String, f64>>,
}

impl From<&ExchangeSession> for StateResponse {
    fn from(session: &ExchangeSession) -> Self {
        Self {
            date: session.now(),
            has_next: session.has_next(),
            prices: session.current_prices().to_map(),
            balance: session.balance().to_map(),
            capital: session.capital(),
            portfolio: session.portfolio().ok().map(|portfolio| portfolio.to_map()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OrderResponse {
    pub outcome: OrderOutcome,
    pub state: StateResponse,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RebalanceRequest {
    pub target: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InitResponse {
    pub backtest_id: BacktestId,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub dataset: String,
    pub currencies: Vec<String>,
    pub fee: f64,
    pub min_order_size: f64,
}

#[derive(Debug, Display, Error)]
pub enum ServerError {
    #[display("unknown backtest: {backtest_id}")]
    UnknownBacktest { backtest_id: BacktestId },
    #[display("unknown dataset: {dataset}")]
    UnknownDataset { dataset: String },
    #[display("{source}")]
    Exchange { source: ExchangeError },
}

impl From<ExchangeError> for ServerError {
    fn from(source: ExchangeError) -> Self {
        ServerError::Exchange { source }
    }
}

impl actix_web::ResponseError for ServerError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::BAD_REQUEST
    }
}

type XchgState = Mutex<AppState>;

pub mod server {
    use std::sync::PoisonError;

    use actix_web::{get, post, web};

    use super::{
        BacktestId, InfoResponse, InitResponse, OrderRequest, OrderResponse, RebalanceRequest,
        ServerError, StateResponse, XchgState,
    };
    use crate::exchange::orders::Order;

    #[get("/init/{dataset_name}")]
    pub async fn init(
        app: web::Data<XchgState>,
        path: web::Path<(String,)>,
    ) -> Result<web::Json<InitResponse>, ServerError> {
        let mut xchg = app.lock().unwrap_or_else(PoisonError::into_inner);
        let (dataset_name,) = path.into_inner();

        let backtest_id = xchg.init(dataset_name)?;
        Ok(web::Json(InitResponse { backtest_id }))
    }

    #[get("/backtest/{backtest_id}/info")]
    pub async fn info(
        app: web::Data<XchgState>,
        path: web::Path<(BacktestId,)>,
    ) -> Result<web::Json<InfoResponse>, ServerError> {
        let xchg = app.lock().unwrap_or_else(PoisonError::into_inner);
        let (backtest_id,) = path.into_inner();

        let backtest = xchg.backtest(backtest_id)?;
        Ok(web::Json(InfoResponse {
            version: "v1".to_string(),
            dataset: backtest.dataset_name.clone(),
            currencies: backtest.session.currencies().to_vec(),
            fee: backtest.session.fee(),
            min_order_size: backtest.session.min_order_size(),
        }))
    }

    #[get("/backtest/{backtest_id}/state")]
    pub async fn state(
        app: web::Data<XchgState>,
        path: web::Path<(BacktestId,)>,
    ) -> Result<web::Json<StateResponse>, ServerError> {
        let xchg = app.lock().unwrap_or_else(PoisonError::into_inner);
        let (backtest_id,) = path.into_inner();

        Ok(web::Json(xchg.state(backtest_id)?))
    }

    #[get("/backtest/{backtest_id}/advance")]
    pub async fn advance(
        app: web::Data<XchgState>,
        path: web::Path<(BacktestId,)>,
    ) -> Result<web::Json<StateResponse>, ServerError> {
        let mut xchg = app.lock().unwrap_or_else(PoisonError::into_inner);
        let (backtest_id,) = path.into_inner();

        Ok(web::Json(xchg.advance(backtest_id)?))
    }

    #[post("/backtest/{backtest_id}/buy")]
    pub async fn buy(
        app: web::Data<XchgState>,
        path: web::Path<(BacktestId,)>,
        request: web::Json<OrderRequest>,
    ) -> Result<web::Json<OrderResponse>, ServerError> {
        let mut xchg = app.lock().unwrap_or_else(PoisonError::into_inner);
        let (backtest_id,) = path.into_inner();

        let order = Order::market_buy(request.symbol.clone(), request.qty);
        Ok(web::Json(xchg.execute(backtest_id, &order)?))
    }

    #[post("/backtest/{backtest_id}/sell")]
    pub async fn sell(
        app: web::Data<XchgState>,
        path: web::Path<(BacktestId,)>,
        request: web::Json<OrderRequest>,
    ) -> Result<web::Json<OrderResponse>, ServerError> {
        let mut xchg = app.lock().unwrap_or_else(PoisonError::into_inner);
        let (backtest_id,) = path.into_inner();

        let order = Order::market_sell(request.symbol.clone(), request.qty);
        Ok(web::Json(xchg.execute(backtest_id, &order)?))
    }

    #[post("/backtest/{backtest_id}/rebalance")]
    pub async fn rebalance(
        app: web::Data<XchgState>,
        path: web::Path<(BacktestId,)>,
        request: web::Json<RebalanceRequest>,
    ) -> Result<web::Json<StateResponse>, ServerError> {
        let mut xchg = app.lock().unwrap_or_else(PoisonError::into_inner);
        let (backtest_id,) = path.into_inner();

        Ok(web::Json(xchg.rebalance(backtest_id, &request.target)?))
    }
}
