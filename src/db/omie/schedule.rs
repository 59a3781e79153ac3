use std::fmt::Display;

use jiff::{civil::Date, ToSpan};

use crate::db::omie::config::{Category, Frequency, HarvestConfig, ARCHIVE_SUFFIX};

/// One file to fetch.  The category is also the folder the file lands in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    pub category: String,
    pub filename: String,
}

impl Task {
    pub fn new(category: &str, filename: String) -> Task {
        Task {
            category: category.to_string(),
            filename,
        }
    }
}

impl Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.category, self.filename)
    }
}

/// All the files published between two days, both inclusive.
///
/// Walks the calendar one day at a time:
///   - a daily category gets `<name>_<YYYYMMDD><suffix>` for each suffix,
///     plus `<name>_<YYYY>.zip` on January 1st,
///   - a monthly category gets `<name>_<YYYYMM>.zip` on the 1st of the month.
///
/// Within a day the categories come out in the order they are declared.
/// Calling [`TaskSchedule::iter`] again starts over from the first day.
#[derive(Debug, Clone)]
pub struct TaskSchedule<'a> {
    pub start: Date,
    pub end: Date,
    pub categories: &'a [Category],
}

impl<'a> TaskSchedule<'a> {
    pub fn new(start: Date, end: Date, categories: &'a [Category]) -> TaskSchedule<'a> {
        TaskSchedule {
            start,
            end,
            categories,
        }
    }

    /// The full year range of a harvest.
    pub fn from_config(config: &'a HarvestConfig) -> TaskSchedule<'a> {
        TaskSchedule::new(config.start(), config.end(), &config.categories)
    }

    pub fn iter(&self) -> impl Iterator<Item = Task> + '_ {
        let end = self.end;
        self.start
            .series(1.day())
            .take_while(move |day| *day <= end)
            .flat_map(move |day| self.tasks_on(day))
    }

    /// The tasks for a single day, in emission order.
    pub fn tasks_on(&self, day: Date) -> Vec<Task> {
        let mut tasks = Vec::new();
        for category in self.categories {
            let name = category.name.as_str();
            match &category.frequency {
                Frequency::Daily { suffixes } => {
                    let ymd = day.strftime("%Y%m%d").to_string();
                    for suffix in suffixes {
                        tasks.push(Task::new(name, format!("{}_{}{}", name, ymd, suffix)));
                    }
                    if day.month() == 1 && day.day() == 1 {
                        tasks.push(Task::new(
                            name,
                            format!("{}_{}{}", name, day.strftime("%Y"), ARCHIVE_SUFFIX),
                        ));
                    }
                }
                Frequency::Monthly => {
                    if day.day() == 1 {
                        tasks.push(Task::new(
                            name,
                            format!("{}_{}{}", name, day.strftime("%Y%m"), ARCHIVE_SUFFIX),
                        ));
                    }
                }
            }
        }
        tasks
    }

    /// Number of tasks [`TaskSchedule::iter`] produces, without walking the
    /// calendar.
    pub fn len(&self) -> usize {
        if self.start > self.end {
            return 0;
        }
        let days = (self.end - self.start).get_days() as usize + 1;

        // count the 1st of the months and the January 1st in the range
        let month_index = |d: Date| d.year() as i64 * 12 + d.month() as i64 - 1;
        let first_month = if self.start.day() == 1 {
            month_index(self.start)
        } else {
            month_index(self.start) + 1
        };
        let month_starts = (month_index(self.end) - first_month + 1).max(0) as usize;
        let first_year = if self.start.month() == 1 && self.start.day() == 1 {
            self.start.year() as i64
        } else {
            self.start.year() as i64 + 1
        };
        let year_starts = (self.end.year() as i64 - first_year + 1).max(0) as usize;

        self.categories
            .iter()
            .map(|category| match &category.frequency {
                Frequency::Daily { suffixes } => days * suffixes.len() + year_starts,
                Frequency::Monthly => month_starts,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
