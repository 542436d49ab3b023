//! Domain layer: unlock records, deal codes, refunds, money and the ports the
//! application layer depends on.

pub mod catalog;
pub mod deal_code;
pub mod money;
pub mod notification;
pub mod ports;
pub mod refund;
pub mod unlock;
