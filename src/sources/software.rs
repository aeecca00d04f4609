//! Hand-picked desktop software. The catalog ships with the binary; ids are
//! derived from the title so re-runs update the same rows.

use anyhow::Result;
use flate2::Crc;

use super::RowSource;
use crate::catalog::{DownloadRow, Table, to_row};
use crate::store::Row;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftwareEntry {
    pub title: &'static str,
    pub poster_url: &'static str,
    pub rating: f64,
    pub year: i32,
    pub download_url: &'static str,
    pub description: &'static str,
}

pub const SOFTWARE: [SoftwareEntry; 32] = [
    SoftwareEntry {
        title: "Google Chrome",
        poster_url: concat!(
            "https://www.google.com/chrome/static/images/favicons/",
            "apple-touch-icon-180x180.png"
        ),
        rating: 9.2,
        year: 2008,
        download_url: "https://www.google.com/chrome/",
        description: "متصفح سريع وآمن من جوجل",
    },
    SoftwareEntry {
        title: "Mozilla Firefox",
        poster_url: concat!(
            "https://www.mozilla.org/media/protocol/img/logos/firefox/browser/",
            "logo-md.55a1e92c45ae.png"
        ),
        rating: 9.0,
        year: 2004,
        download_url: "https://www.mozilla.org/firefox/new/",
        description: "متصفح مجاني مفتوح المصدر",
    },
    SoftwareEntry {
        title: "Brave",
        poster_url: "https://brave.com/static-assets/images/press/brave-icon.png",
        rating: 8.5,
        year: 2016,
        download_url: "https://brave.com/download/",
        description: "متصفح خصوصية مبني على كروميوم",
    },
    SoftwareEntry {
        title: "VLC Media Player",
        poster_url: "https://www.videolan.org/images/favicon_vlc.png",
        rating: 9.5,
        year: 2001,
        download_url: "https://www.videolan.org/vlc/",
        description: "مشغل وسائط مجاني متعدد المنصات",
    },
    SoftwareEntry {
        title: "PotPlayer",
        poster_url: "https://potplayer.daum.net/common/img/favicon-192x192.png",
        rating: 8.8,
        year: 2008,
        download_url: "https://potplayer.daum.net/",
        description: "مشغل فيديو خفيف مع خصائص متقدمة",
    },
    SoftwareEntry {
        title: "7-Zip",
        poster_url: "https://www.7-zip.org/img/logo.png",
        rating: 9.3,
        year: 1999,
        download_url: "https://www.7-zip.org/download.html",
        description: "أداة مجانية لفك وضغط الملفات",
    },
    SoftwareEntry {
        title: "WinRAR",
        poster_url: "https://www.win-rar.com/pictures/winrar-logo.png",
        rating: 8.7,
        year: 1995,
        download_url: "https://www.win-rar.com/download.html",
        description: "أداة ضغط وفتح أرشيفات شعبية",
    },
    SoftwareEntry {
        title: "qBittorrent",
        poster_url: "https://www.qbittorrent.org/img/qbittorrent-logo.png",
        rating: 9.1,
        year: 2006,
        download_url: "https://www.qbittorrent.org/download",
        description: "مدير تورنت خفيف ومفتوح المصدر",
    },
    SoftwareEntry {
        title: "Internet Download Manager",
        poster_url: "https://www.internetdownloadmanager.com/favicon.ico",
        rating: 8.9,
        year: 2005,
        download_url: "https://www.internetdownloadmanager.com/download.html",
        description: "مدير تحميلات سريع وداعم للاستكمال",
    },
    SoftwareEntry {
        title: "Discord",
        poster_url: "https://discord.com/assets/847541504914fd33810e70a0ea73177e.ico",
        rating: 9.0,
        year: 2015,
        download_url: "https://discord.com/download",
        description: "دردشة صوتية ومرئية ومجتمعات للألعاب",
    },
    SoftwareEntry {
        title: "Steam",
        poster_url: "https://store.steampowered.com/favicon.ico",
        rating: 9.4,
        year: 2003,
        download_url: "https://store.steampowered.com/about/",
        description: "منصة ألعاب وتوزيع رقمي",
    },
    SoftwareEntry {
        title: "Epic Games Launcher",
        poster_url: "https://static-assets-prod.epicgames.com/epic-store/static/favicon.ico",
        rating: 8.3,
        year: 2018,
        download_url: "https://store.epicgames.com/download",
        description: "مشغل متجر Epic للألعاب",
    },
    SoftwareEntry {
        title: "Visual Studio Code",
        poster_url: "https://code.visualstudio.com/favicon.ico",
        rating: 9.6,
        year: 2015,
        download_url: "https://code.visualstudio.com/Download",
        description: "محرر كود مجاني من مايكروسوفت",
    },
    SoftwareEntry {
        title: "PyCharm Community",
        poster_url: concat!(
            "https://resources.jetbrains.com/storage/products/company/brand/logos/",
            "PyCharm_icon.png"
        ),
        rating: 8.7,
        year: 2010,
        download_url: "https://www.jetbrains.com/pycharm/download/",
        description: "بيئة تطوير بايثون مجانية",
    },
    SoftwareEntry {
        title: "Node.js",
        poster_url: "https://nodejs.org/static/images/favicons/favicon-32x32.png",
        rating: 9.0,
        year: 2009,
        download_url: "https://nodejs.org/en/download",
        description: "بيئة تشغيل جافاسكريبت على الخادم",
    },
    SoftwareEntry {
        title: "Git",
        poster_url: "https://git-scm.com/favicon.ico",
        rating: 9.2,
        year: 2005,
        download_url: "https://git-scm.com/download/win",
        description: "نظام التحكم بالإصدارات الموزع",
    },
    SoftwareEntry {
        title: "Docker Desktop",
        poster_url: "https://www.docker.com/wp-content/uploads/2022/03/Moby-logo.png",
        rating: 8.8,
        year: 2013,
        download_url: "https://www.docker.com/products/docker-desktop/",
        description: "حاويات للتطوير والتشغيل",
    },
    SoftwareEntry {
        title: "Postman",
        poster_url: "https://www.postman.com/_next/static/images/favicon-3acb7a2a16-32x32.png",
        rating: 8.9,
        year: 2014,
        download_url: "https://www.postman.com/downloads/",
        description: "أداة لاختبار واجهات REST",
    },
    SoftwareEntry {
        title: "Figma",
        poster_url: "https://static.figma.com/app/icon/1/favicon.ico",
        rating: 9.1,
        year: 2016,
        download_url: "https://www.figma.com/downloads/",
        description: "تصميم واجهات ومخططات",
    },
    SoftwareEntry {
        title: "Adobe Photoshop",
        poster_url: "https://www.adobe.com/content/dam/cc/icons/photoshop-mobile.svg",
        rating: 9.0,
        year: 1990,
        download_url: "https://www.adobe.com/products/photoshop.html",
        description: "تحرير صور احترافي",
    },
    SoftwareEntry {
        title: "Adobe Acrobat Reader",
        poster_url: concat!(
            "https://acrobat.adobe.com/etc.clientlibs/adobe/clientlibs/",
            "clientlib-base/resources/images/favicon_180x180.png"
        ),
        rating: 8.5,
        year: 1993,
        download_url: "https://get.adobe.com/reader/",
        description: "قارئ ملفات PDF",
    },
    SoftwareEntry {
        title: "GIMP",
        poster_url: "https://www.gimp.org/images/wilber-512.png",
        rating: 8.6,
        year: 1996,
        download_url: "https://www.gimp.org/downloads/",
        description: "بديل مفتوح المصدر لبرامج تحرير الصور",
    },
    SoftwareEntry {
        title: "Blender",
        poster_url: "https://download.blender.org/branding/blender_logo_socket.png",
        rating: 9.0,
        year: 1998,
        download_url: "https://www.blender.org/download/",
        description: "نمذجة وتحريك ثلاثي الأبعاد",
    },
    SoftwareEntry {
        title: "OBS Studio",
        poster_url: "https://obsproject.com/assets/images/new_icon_small.png",
        rating: 9.2,
        year: 2012,
        download_url: "https://obsproject.com/download",
        description: "بث وتسجيل مفتوح المصدر",
    },
    SoftwareEntry {
        title: "Notion",
        poster_url: "https://www.notion.so/images/favicon.ico",
        rating: 8.7,
        year: 2016,
        download_url: "https://www.notion.so/desktop",
        description: "ملاحظات وإدارة مشاريع",
    },
    SoftwareEntry {
        title: "Obsidian",
        poster_url: "https://obsidian.md/favicon-32x32.png",
        rating: 8.8,
        year: 2020,
        download_url: "https://obsidian.md/download",
        description: "ملاحظات وروابط معرفية",
    },
    SoftwareEntry {
        title: "Telegram Desktop",
        poster_url: "https://telegram.org/img/t_logo.svg",
        rating: 8.4,
        year: 2013,
        download_url: "https://desktop.telegram.org/",
        description: "مراسلة سريعة وآمنة",
    },
    SoftwareEntry {
        title: "WhatsApp Desktop",
        poster_url: "https://static.whatsapp.net/rsrc.php/yv/r/6v0fGwNnTzY.svg",
        rating: 8.0,
        year: 2016,
        download_url: "https://www.whatsapp.com/download",
        description: "واتساب لسطح المكتب",
    },
    SoftwareEntry {
        title: "Microsoft PowerToys",
        poster_url: "https://learn.microsoft.com/favicon.ico",
        rating: 8.3,
        year: 2019,
        download_url: "https://learn.microsoft.com/windows/powertoys/",
        description: "أدوات إنتاجية لنظام ويندوز",
    },
    SoftwareEntry {
        title: "Everything Search",
        poster_url: "https://www.voidtools.com/Everything-1.5a.png",
        rating: 8.6,
        year: 2008,
        download_url: "https://www.voidtools.com/downloads/",
        description: "بحث فوري عن الملفات",
    },
    SoftwareEntry {
        title: "PuTTY",
        poster_url: "https://www.chiark.greenend.org.uk/~sgtatham/putty/latest/x86/putty.ico",
        rating: 8.0,
        year: 1999,
        download_url: "https://www.putty.org/",
        description: "عميل SSH/Telnet خفيف",
    },
    SoftwareEntry {
        title: "WinSCP",
        poster_url: "https://winscp.net/favicon-32x32.png",
        rating: 8.1,
        year: 2000,
        download_url: "https://winscp.net/eng/download.php",
        description: "عميل SFTP وFTP آمن",
    },
];

/// CRC-32 of the lowercased title.
pub fn software_id(title: &str) -> u64 {
    let mut crc = Crc::new();
    crc.update(title.to_lowercase().as_bytes());
    u64::from(crc.sum())
}

impl SoftwareEntry {
    pub fn to_download_row(&self) -> DownloadRow {
        DownloadRow {
            id: software_id(self.title),
            title: self.title.to_string(),
            poster_url: Some(self.poster_url.to_string()),
            rating: self.rating,
            year: Some(self.year),
            description: self.description.to_string(),
            download_url: self.download_url.to_string(),
            category: "PC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SoftwareCatalog {
    entries: &'static [SoftwareEntry],
}

impl Default for SoftwareCatalog {
    fn default() -> Self {
        Self { entries: &SOFTWARE }
    }
}

impl SoftwareCatalog {
    pub fn rows(&self) -> Vec<DownloadRow> {
        self.entries.iter().map(SoftwareEntry::to_download_row).collect()
    }
}

impl RowSource for SoftwareCatalog {
    fn table(&self) -> Table {
        Table::Software
    }

    fn fetch_rows(&self) -> Result<Vec<Row>> {
        self.rows().iter().map(to_row).collect()
    }

    fn renamed_column(&self) -> Option<(&'static str, &'static str)> {
        Some(("year", "release_year"))
    }
}
