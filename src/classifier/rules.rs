//! Deterministic keyword rules
//!
//! Used whenever the remote model is unavailable or answers with something
//! unusable. Every table is evaluated in declaration order and the first hit
//! wins, so reordering entries changes behaviour.

use super::Intent;
use crate::taxonomy::DEFAULT_FOLDER;

/// Substrings that mark a request for advice. Checked before anything else.
pub static ADVICE_MARKERS: &[&str] = &[
    "посовет",
    "рекоменд",
    "что делать",
    "как лучше",
    "что посмотреть",
    "что почитать",
    "помоги выбрать",
    "какой",
    "какую",
    "что лучше",
    "помоги",
    "подскажи",
    "дай совет",
    "что бы",
    "что можно",
    "какие",
    "каких",
    "что",
    "как",
    "где",
    "когда",
    "почему",
];

/// Leading interrogatives
pub static INTERROGATIVE_PREFIXES: &[&str] = &["что ", "как ", "где ", "когда ", "почему "];

/// Substrings that mark a calendar event
pub static CALENDAR_MARKERS: &[&str] = &[
    "напомни",
    "завтра",
    "послезавтра",
    "встреча",
    "событие",
    "календар",
    "время",
    "дата",
    "когда",
    "во сколько",
];

/// Substrings that mark an audio note
pub static AUDIO_MARKERS: &[&str] = &["аудио", "диктофон", "запись", "голос"];

/// Folder keyword table, first match wins.
pub static FOLDER_KEYWORDS: &[(&str, &[&str])] = &[
    ("Проекты и задачи", &["проект", "задача", "дедлайн", "задание", "работа", "бизнес"]),
    ("Коллеги", &["коллега", "сотрудник", "начальник", "команда", "офис"]),
    ("Контакты и нетворк", &["контакт", "нетворк", "знакомство", "бизнес-контакт", "партнер"]),
    ("Идеи и инсайты", &["идея", "инсайт", "мысль", "озарение", "решение"]),
    ("Расшифровки встреч", &["встреча", "совещание", "митинг", "расшифровка", "протокол"]),
    (
        "Спорт и активность",
        &["спорт", "тренировка", "зал", "бег", "футбол", "баскетбол", "плавание", "фитнес", "активность"],
    ),
    ("Визиты к врачам", &["врач", "доктор", "больница", "клиника", "прием", "визит к врачу"]),
    ("Анализы", &["анализ", "кровь", "моча", "результат анализа", "лаборатория"]),
    ("Лекарства", &["лекарство", "таблетка", "препарат", "медикамент", "принимаю", "витамин"]),
    ("Питание", &["питание", "еда", "диета", "рацион", "калории"]),
    ("Сон", &["сон", "сплю", "бессонница", "сонливость"]),
    ("Привычки", &["привычка", "привычки", "ритуал"]),
    (
        "Семья",
        &["мама", "папа", "родители", "брат", "сестра", "бабушка", "дедушка", "семья", "родственник"],
    ),
    ("Друзья", &["друг", "подруга", "друзья", "компания", "встретиться", "приятель"]),
    ("Коллеги и партнеры", &["коллега", "партнер", "сотрудник"]),
    ("Новые знакомства", &["знакомство", "новый знакомый", "познакомился"]),
    ("Дни рождения и важные даты", &["день рождения", "др", "дата", "праздник"]),
    ("Домашние дела", &["дом", "домашнее", "уборка", "стирка", "готовка"]),
    ("Покупки для дома", &["покупка", "купить", "магазин", "молоко", "хлеб", "продукты"]),
    ("Ремонт и обслуживание", &["ремонт", "обслуживание", "починка", "ремонтировать"]),
    ("Курсы и программы", &["курс", "программа", "обучение", "учеба"]),
    ("Книги и конспекты", &["книга", "конспект", "чтение", "университет", "школа"]),
    ("Навыки", &["навык", "умение", "способность"]),
    ("Домашка и упражнения", &["домашнее задание", "домашка", "упражнение", "задача"]),
    ("Планы развития", &["план", "развитие", "цель"]),
    ("Записи лекций и уроков", &["лекция", "урок", "запись лекции"]),
    ("Хобби и проекты", &["хобби", "увлечение", "проект", "коллекция"]),
    ("Книги", &["книга", "читать", "чтение", "литература"]),
    (
        "Фильмы и сериалы",
        &["фильм", "кино", "сериал", "ужастик", "ужастики", "ужас", "хоррор", "люблю", "нравится", "смотрю"],
    ),
    ("Музыка и подкасты", &["музыка", "песня", "подкаст", "альбом", "исполнитель"]),
    ("Игры", &["игра", "игровой", "геймер"]),
    ("Творчество", &["рисование", "творчество", "рисую", "рисунок"]),
    ("Места", &["место", "адрес", "локация"]),
    ("Поездки", &["поездка", "путешествие", "отпуск", "город", "страна"]),
    ("Мероприятия", &["мероприятие", "событие", "концерт", "выставка"]),
    ("Ветеринары", &["ветеринар", "ветеринарный", "ветклиника"]),
    ("Прививки и лечение", &["прививка", "вакцина", "лечение", "кот", "собака", "питомец"]),
    ("Корм и вкусняшки", &["корм", "еда для", "вкусняшка", "покормить"]),
    ("Особенности поведения", &["поведение", "характер", "привычка питомца"]),
    ("Рецепты и любимые блюда", &["рецепт", "блюдо", "готовить", "кулинария"]),
    ("Рестораны и кафе", &["ресторан", "кафе", "заведение"]),
    ("Паспорт, визы", &["паспорт", "виза", "документ"]),
    ("Договоры", &["договор", "контракт", "соглашение"]),
    ("Полисы и страховки", &["полис", "страховка", "страхование"]),
    ("Гарантии на технику", &["гарантия", "техника", "гарантийный"]),
    ("Обслуживание и ТО", &["обслуживание", "то", "техобслуживание", "машина", "авто"]),
    ("Страховки", &["страховка", "осаго", "каско"]),
    ("Пробег и расходы", &["пробег", "расход", "бензин", "топливо"]),
];

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

/// Classify by keyword rules alone. Total and deterministic.
pub fn fallback_classify(text: &str) -> Intent {
    let lower = text.to_lowercase();

    if lower.contains('?')
        || contains_any(&lower, ADVICE_MARKERS)
        || INTERROGATIVE_PREFIXES.iter().any(|p| lower.starts_with(p))
    {
        return Intent::Advice;
    }

    if contains_any(&lower, CALENDAR_MARKERS) {
        return Intent::Calendar;
    }

    if contains_any(&lower, AUDIO_MARKERS) {
        return Intent::Audio;
    }

    Intent::Memory {
        folder: Some(match_folder(&lower).to_string()),
    }
}

/// First folder whose keywords occur in `text`, else the catch-all folder.
pub fn match_folder(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    FOLDER_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(&lower, keywords))
        .map(|(folder, _)| *folder)
        .unwrap_or(DEFAULT_FOLDER)
}
