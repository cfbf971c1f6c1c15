//! Language codes used to key localized text and chapter translations

use crate::error::{Error, Result};

use serde::de::IntoDeserializer as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// ISO 639-1 codes plus the regional variants manga sites use (`pt-br`, `es-la`, ...)
#[derive(
    Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Debug, std::hash::Hash, Clone, Copy, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum Locale {
    Ab,
    Aa,
    Af,
    Ak,
    Sq,
    Am,
    Ar,
    An,
    Hy,
    Av,
    Ae,
    Ay,
    Az,
    Bm,
    Ba,
    Eu,
    Be,
    Bn,
    Bi,
    Bs,
    Br,
    Bg,
    My,
    Ca,
    Ch,
    Ce,
    Ny,
    Zh,
    Cu,
    Cv,
    Kw,
    Co,
    Cr,
    Hr,
    Cs,
    Da,
    Dv,
    Dz,
    #[default]
    En,
    Eo,
    Et,
    Ee,
    Fo,
    Fj,
    Fr,
    Fi,
    Fy,
    Ff,
    Gd,
    Gl,
    Lg,
    Ka,
    De,
    El,
    Kl,
    Gn,
    Gu,
    Hu,
    Ht,
    Ha,
    He,
    Hi,
    Ho,
    Is,
    Io,
    Ig,
    Id,
    Ia,
    Ie,
    Iu,
    Ik,
    Ga,
    It,
    Ja,
    Jv,
    Kn,
    Kr,
    Ks,
    Kk,
    Km,
    Ki,
    Rw,
    Ky,
    Kv,
    Kg,
    Ko,
    Kj,
    Ku,
    Lo,
    La,
    Lv,
    Li,
    Ln,
    Lt,
    Lu,
    Lb,
    Mk,
    Mg,
    Ms,
    Ml,
    Mt,
    Gv,
    Mi,
    Mr,
    Mh,
    Mn,
    Na,
    Nv,
    Nd,
    Nr,
    Ng,
    Ne,
    No,
    Nb,
    Nn,
    Nl,
    Oc,
    Oj,
    Or,
    Om,
    Os,
    Pi,
    Ps,
    Fa,
    Pl,
    Pt,
    Pa,
    Qu,
    Ro,
    Rm,
    Rn,
    Ru,
    Se,
    Sm,
    Sg,
    Sa,
    Sc,
    Sr,
    Sn,
    Sd,
    Si,
    Sk,
    Sl,
    So,
    St,
    Es,
    Su,
    Sw,
    Ss,
    Sv,
    Tl,
    Ty,
    Tg,
    Ta,
    Tt,
    Te,
    Th,
    Bo,
    Ti,
    To,
    Ts,
    Tn,
    Tr,
    Tk,
    Tw,
    Ug,
    Uk,
    Ur,
    Uz,
    Ve,
    Vi,
    Vo,
    Wa,
    Cy,
    Wo,
    Xh,
    Ii,
    Yi,
    Yo,
    Za,
    Zu,
    As,
    ZhHk,
    PtBr,
    EsLa,
    JaRo,
    KoRo,
    ZhRo,
}

pub type LocalizedString = HashMap<Locale, String>;

impl Locale {
    /// Name of the language in the language itself, for the languages commonly seen on manga sites
    pub fn native_name(&self) -> Option<&'static str> {
        let name = match self {
            Locale::Ar => "العربية",
            Locale::Bg => "български език",
            Locale::Ca => "català",
            Locale::Cs => "čeština",
            Locale::Da => "dansk",
            Locale::De => "Deutsch",
            Locale::El => "ελληνικά",
            Locale::En => "English",
            Locale::Es => "español",
            Locale::EsLa => "español (Latinoamérica)",
            Locale::Fa => "فارسی",
            Locale::Fi => "suomi",
            Locale::Fr => "français",
            Locale::He => "עברית",
            Locale::Hi => "हिन्दी",
            Locale::Hu => "magyar",
            Locale::Id => "Bahasa Indonesia",
            Locale::It => "italiano",
            Locale::Ja => "日本語",
            Locale::JaRo => "日本語 (rōmaji)",
            Locale::Ko => "한국어",
            Locale::KoRo => "한국어 (romanization)",
            Locale::Lt => "lietuvių kalba",
            Locale::Mn => "Монгол",
            Locale::Ms => "bahasa Melayu",
            Locale::My => "ဗမာစာ",
            Locale::Nl => "Nederlands",
            Locale::No => "Norsk",
            Locale::Pl => "polski",
            Locale::Pt => "português",
            Locale::PtBr => "português (Brasil)",
            Locale::Ro => "română",
            Locale::Ru => "русский",
            Locale::Sr => "српски језик",
            Locale::Sv => "svenska",
            Locale::Th => "ไทย",
            Locale::Tl => "Wikang Tagalog",
            Locale::Tr => "Türkçe",
            Locale::Uk => "українська",
            Locale::Vi => "Tiếng Việt",
            Locale::Zh => "中文",
            Locale::ZhHk => "中文 (香港)",
            Locale::ZhRo => "中文 (pinyin)",
            _ => return None,
        };

        Some(name)
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_lowercase().replace('_', "-");

        Locale::deserialize(code.as_str().into_deserializer()).map_err(
            |_: serde::de::value::Error| {
                Error::InvalidArgument(format!("'{s}' is not a known language code"))
            },
        )
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self) {
            Ok(Value::String(code)) => f.write_str(&code),
            _ => Err(fmt::Error),
        }
    }
}
