//! Подготовка переведенного текста к синтезу речи

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref DIGITS: Regex = Regex::new(r"\d+").unwrap();
    static ref HINDI_NUMBERS: HashMap<&'static str, &'static str> = [
        ("0", "शून्य"), ("1", "एक"), ("2", "दो"), ("3", "तीन"), ("4", "चार"),
        ("5", "पांच"), ("6", "छह"), ("7", "सात"), ("8", "आठ"), ("9", "नौ"),
        ("10", "दस"), ("11", "ग्यारह"), ("12", "बारह"), ("13", "तेरह"), ("14", "चौदह"),
        ("15", "पंद्रह"), ("16", "सोलह"), ("17", "सत्रह"), ("18", "अठारह"), ("19", "उन्नीस"),
        ("20", "बीस"), ("21", "इक्कीस"), ("22", "बाईस"), ("23", "तेईस"), ("24", "चौबीस"),
        ("25", "पच्चीस"), ("26", "छब्बीस"), ("27", "सत्ताईस"), ("28", "अट्ठाईस"), ("29", "उनतीस"),
        ("30", "तीस"), ("40", "चालीस"), ("50", "पचास"), ("60", "साठ"), ("70", "सत्तर"),
        ("80", "अस्सी"), ("90", "नब्बे"), ("100", "सौ"),
    ]
    .into_iter()
    .collect();
}

/// Подготовка текста для TTS
///
/// - Удаляет HTML-теги и раскрывает основные сущности
/// - Для хинди заменяет известные числа словами (остальные остаются цифрами)
/// - Удаляет точки и данду: модель озвучивает одно предложение за раз
/// - Нормализует пробелы
pub fn prepare_for_synthesis(text: &str, language: &str) -> String {
    let text = HTML_TAG.replace_all(text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    let text = if language == "hi" {
        DIGITS
            .replace_all(&text, |caps: &regex::Captures| {
                let number = &caps[0];
                HINDI_NUMBERS.get(number).copied().unwrap_or(number).to_string()
            })
            .into_owned()
    } else {
        text
    };

    let text = text.replace(['.', '।'], "");
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}
