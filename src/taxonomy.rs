//! Folder taxonomy
//!
//! A fixed two-level table of categories and the folders filed under them.
//! Memories may only live in folders listed here. Category and folder order
//! is stable and is what the classification prompt enumerates.

use serde::Serialize;

/// Folder every unmatched memory lands in
pub const DEFAULT_FOLDER: &str = "Хобби и проекты";

/// A top-level category and its folders
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Category {
    /// Category display name
    pub name: &'static str,
    /// Ordered folder names
    pub folders: &'static [&'static str],
}

/// The full taxonomy, in display order
pub static TAXONOMY: &[Category] = &[
    Category {
        name: "Работа и карьера",
        folders: &[
            "Проекты и задачи",
            "Коллеги",
            "Контакты и нетворк",
            "Идеи и инсайты",
            "Расшифровки встреч",
        ],
    },
    Category {
        name: "Здоровье и тело",
        folders: &[
            "Спорт и активность",
            "Визиты к врачам",
            "Анализы",
            "Лекарства",
            "Питание",
            "Сон",
            "Привычки",
        ],
    },
    Category {
        name: "Отношения и люди",
        folders: &[
            "Семья",
            "Друзья",
            "Коллеги и партнеры",
            "Новые знакомства",
            "Дни рождения и важные даты",
        ],
    },
    Category {
        name: "Дом и быт",
        folders: &["Домашние дела", "Покупки для дома", "Ремонт и обслуживание"],
    },
    Category {
        name: "Обучение и развитие",
        folders: &[
            "Курсы и программы",
            "Книги и конспекты",
            "Навыки",
            "Домашка и упражнения",
            "Планы развития",
            "Записи лекций и уроков",
        ],
    },
    Category {
        name: "Увлечения и досуг",
        folders: &[
            "Хобби и проекты",
            "Книги",
            "Фильмы и сериалы",
            "Музыка и подкасты",
            "Игры",
            "Творчество",
        ],
    },
    Category {
        name: "Места и путешествия",
        folders: &["Места", "Поездки", "Мероприятия"],
    },
    Category {
        name: "Домашние животные",
        folders: &[
            "Ветеринары",
            "Прививки и лечение",
            "Корм и вкусняшки",
            "Особенности поведения",
        ],
    },
    Category {
        name: "Еда и кулинария",
        folders: &["Рецепты и любимые блюда", "Рестораны и кафе"],
    },
    Category {
        name: "Документы",
        folders: &[
            "Паспорт, визы",
            "Договоры",
            "Полисы и страховки",
            "Гарантии на технику",
        ],
    },
    Category {
        name: "Авто и транспорт",
        folders: &["Обслуживание и ТО", "Страховки", "Пробег и расходы"],
    },
];

/// Whether `name` is one of the taxonomy folders (exact match).
pub fn is_valid_folder(name: &str) -> bool {
    TAXONOMY
        .iter()
        .any(|c| c.folders.iter().any(|f| *f == name))
}

/// Category a folder belongs to.
pub fn category_of(folder: &str) -> Option<&'static str> {
    TAXONOMY
        .iter()
        .find(|c| c.folders.iter().any(|f| *f == folder))
        .map(|c| c.name)
}

/// All folder names in taxonomy order.
pub fn all_folders() -> impl Iterator<Item = &'static str> {
    TAXONOMY.iter().flat_map(|c| c.folders.iter().copied())
}

/// Render the taxonomy as prompt lines: `- Category: a, b, c`.
pub fn prompt_listing() -> String {
    TAXONOMY
        .iter()
        .map(|c| format!("- {}: {}", c.name, c.folders.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}
