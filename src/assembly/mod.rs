//! Модуль сборки итоговой дорожки
//!
//! Сборщик является единственной точкой сериализации: он принимает согласованные клипы
//! в порядке слотов и единственный пишет в итоговую дорожку.

pub mod assembler;
pub mod report;
