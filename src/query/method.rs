//! Recognized host call signatures.
//!
//! Host method and member names are resolved once per (receiver, name) pair through a
//! static dispatch table; everything downstream matches on the closed [`Method`] and
//! [`Member`] enums.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::types::AppType;

/// Static receiver category of a call or member access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Receiver {
    Array,
    Map,
    Nested,
    String,
    DateTime,
    Json,
    Math,
}

impl Receiver {
    pub fn of(app_type: &AppType) -> Option<Receiver> {
        match app_type.underlying() {
            AppType::Array(_) => Some(Receiver::Array),
            AppType::Map(_, _) => Some(Receiver::Map),
            AppType::Nested(_) => Some(Receiver::Nested),
            AppType::String | AppType::Bytes => Some(Receiver::String),
            AppType::Date | AppType::DateTime | AppType::DateTimeOffset => Some(Receiver::DateTime),
            AppType::Json => Some(Receiver::Json),
            _ => None,
        }
    }

    /// Receiver for a static function class name.
    pub fn of_class(class: &str) -> Option<Receiver> {
        match class {
            "Math" => Some(Receiver::Math),
            "String" | "string" => Some(Receiver::String),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Years,
    Months,
    Days,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl DateUnit {
    pub fn function(&self) -> &'static str {
        match self {
            DateUnit::Years => "addYears",
            DateUnit::Months => "addMonths",
            DateUnit::Days => "addDays",
            DateUnit::Hours => "addHours",
            DateUnit::Minutes => "addMinutes",
            DateUnit::Seconds => "addSeconds",
            DateUnit::Milliseconds => "addMilliseconds",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ArrayContains,
    ArrayAny,
    ArrayAll,
    ArrayFirst,
    ArrayLast,
    ArrayCount,
    ArrayElementAt,
    ArrayWhere,
    ArraySelect,
    ArraySum,
    ArrayMin,
    ArrayMax,
    ArrayDistinct,
    MapContainsKey,
    MapContainsValue,
    MapCount,
    NestedAny,
    NestedCount,
    StringContains,
    StringStartsWith,
    StringEndsWith,
    StringToUpper,
    StringToLower,
    StringTrim,
    StringTrimStart,
    StringTrimEnd,
    StringSubstring,
    StringReplace,
    StringIsNullOrEmpty,
    DateAdd(DateUnit),
    MathAbs,
    MathRound,
    MathFloor,
    MathCeiling,
    MathMax,
    MathMin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    DayOfWeek,
    DayOfYear,
    Date,
}

impl DatePart {
    pub fn function(&self) -> &'static str {
        match self {
            DatePart::Year => "toYear",
            DatePart::Month => "toMonth",
            DatePart::Day => "toDayOfMonth",
            DatePart::Hour => "toHour",
            DatePart::Minute => "toMinute",
            DatePart::Second => "toSecond",
            DatePart::Millisecond => "toMillisecond",
            DatePart::DayOfWeek => "toDayOfWeek",
            DatePart::DayOfYear => "toDayOfYear",
            DatePart::Date => "toDate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    ArrayLength,
    MapCount,
    MapKeys,
    MapValues,
    NestedCount,
    StringLength,
    DatePart(DatePart),
}

static METHODS: Lazy<HashMap<(Receiver, &'static str), Method>> = Lazy::new(|| {
    use Method::*;
    use Receiver as R;

    let entries: &[(Receiver, &str, Method)] = &[
        (R::Array, "Contains", ArrayContains),
        (R::Array, "Any", ArrayAny),
        (R::Array, "All", ArrayAll),
        (R::Array, "First", ArrayFirst),
        (R::Array, "FirstOrDefault", ArrayFirst),
        (R::Array, "Last", ArrayLast),
        (R::Array, "LastOrDefault", ArrayLast),
        (R::Array, "Count", ArrayCount),
        (R::Array, "ElementAt", ArrayElementAt),
        (R::Array, "ElementAtOrDefault", ArrayElementAt),
        (R::Array, "Where", ArrayWhere),
        (R::Array, "Select", ArraySelect),
        (R::Array, "Sum", ArraySum),
        (R::Array, "Min", ArrayMin),
        (R::Array, "Max", ArrayMax),
        (R::Array, "Distinct", ArrayDistinct),
        (R::Map, "ContainsKey", MapContainsKey),
        (R::Map, "ContainsValue", MapContainsValue),
        (R::Map, "Count", MapCount),
        (R::Nested, "Any", NestedAny),
        (R::Nested, "Count", NestedCount),
        (R::String, "Contains", StringContains),
        (R::String, "StartsWith", StringStartsWith),
        (R::String, "EndsWith", StringEndsWith),
        (R::String, "ToUpper", StringToUpper),
        (R::String, "ToUpperInvariant", StringToUpper),
        (R::String, "ToLower", StringToLower),
        (R::String, "ToLowerInvariant", StringToLower),
        (R::String, "Trim", StringTrim),
        (R::String, "TrimStart", StringTrimStart),
        (R::String, "TrimEnd", StringTrimEnd),
        (R::String, "Substring", StringSubstring),
        (R::String, "Replace", StringReplace),
        (R::String, "IsNullOrEmpty", StringIsNullOrEmpty),
        (R::DateTime, "AddYears", DateAdd(DateUnit::Years)),
        (R::DateTime, "AddMonths", DateAdd(DateUnit::Months)),
        (R::DateTime, "AddDays", DateAdd(DateUnit::Days)),
        (R::DateTime, "AddHours", DateAdd(DateUnit::Hours)),
        (R::DateTime, "AddMinutes", DateAdd(DateUnit::Minutes)),
        (R::DateTime, "AddSeconds", DateAdd(DateUnit::Seconds)),
        (R::DateTime, "AddMilliseconds", DateAdd(DateUnit::Milliseconds)),
        (R::Math, "Abs", MathAbs),
        (R::Math, "Round", MathRound),
        (R::Math, "Floor", MathFloor),
        (R::Math, "Ceiling", MathCeiling),
        (R::Math, "Max", MathMax),
        (R::Math, "Min", MathMin),
    ];
    entries.iter().map(|(r, name, m)| ((*r, *name), *m)).collect()
});

static MEMBERS: Lazy<HashMap<(Receiver, &'static str), Member>> = Lazy::new(|| {
    use Receiver as R;

    let entries: &[(Receiver, &str, Member)] = &[
        (R::Array, "Length", Member::ArrayLength),
        (R::Array, "Count", Member::ArrayLength),
        (R::Map, "Count", Member::MapCount),
        (R::Map, "Keys", Member::MapKeys),
        (R::Map, "Values", Member::MapValues),
        (R::Nested, "Count", Member::NestedCount),
        (R::String, "Length", Member::StringLength),
        (R::DateTime, "Year", Member::DatePart(DatePart::Year)),
        (R::DateTime, "Month", Member::DatePart(DatePart::Month)),
        (R::DateTime, "Day", Member::DatePart(DatePart::Day)),
        (R::DateTime, "Hour", Member::DatePart(DatePart::Hour)),
        (R::DateTime, "Minute", Member::DatePart(DatePart::Minute)),
        (R::DateTime, "Second", Member::DatePart(DatePart::Second)),
        (R::DateTime, "Millisecond", Member::DatePart(DatePart::Millisecond)),
        (R::DateTime, "DayOfWeek", Member::DatePart(DatePart::DayOfWeek)),
        (R::DateTime, "DayOfYear", Member::DatePart(DatePart::DayOfYear)),
        (R::DateTime, "Date", Member::DatePart(DatePart::Date)),
    ];
    entries.iter().map(|(r, name, m)| ((*r, *name), *m)).collect()
});

impl Method {
    pub fn resolve(receiver: Receiver, name: &str) -> Option<Method> {
        METHODS.get(&(receiver, name)).copied()
    }
}

impl Member {
    pub fn resolve(receiver: Receiver, name: &str) -> Option<Member> {
        MEMBERS.get(&(receiver, name)).copied()
    }
}
