//! Модуль для работы с аудио
//!
//! Каноническое представление сигнала, декодирование/кодирование,
//! растяжение без изменения высоты тона и согласование длительности клипов.

pub mod format;
pub mod stretch;
pub mod matcher;
